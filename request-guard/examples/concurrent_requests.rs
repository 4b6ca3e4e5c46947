use async_trait::async_trait;
use request_guard::{
    GuardConfig, GuardedClient, HttpResponse, LogObserver, RequestDescriptor, Transport,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Pretends to be a slow network
struct SlowNetwork {
    executions: AtomicUsize,
}

#[async_trait]
impl Transport for SlowNetwork {
    type Error = std::io::Error;

    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, Self::Error> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(HttpResponse::new(200, format!("payload of {}", request.url())))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let network = Arc::new(SlowNetwork {
        executions: AtomicUsize::new(0),
    });
    let guard = request_guard::Guard::new(GuardConfig::new(Duration::from_secs(2)))?
        .with_observer(Arc::new(LogObserver));
    let client = Arc::new(GuardedClient::with_guard(
        Arc::clone(&network),
        Arc::new(guard),
    ));

    println!("=== Concurrent requests ===");
    let calls = [
        "https://example.com/a",
        "https://example.com/a",
        "https://example.com/a",
        "https://example.com/a",
        "https://example.com/b",
        "https://example.com/b",
        "https://example.com/c",
        "https://example.com/d",
    ];

    let start = std::time::Instant::now();
    let mut handles = vec![];
    for url in calls {
        let client = Arc::clone(&client);
        let request = RequestDescriptor::get(Url::parse(url)?);
        handles.push(tokio::spawn(async move { client.send(&request, None).await }));
    }
    for handle in handles {
        let response = handle.await??;
        println!("{} -> {:?}", response.status, response.body);
    }
    println!(
        "{} calls took {:?} with {} network executions",
        calls.len(),
        start.elapsed(),
        network.executions.load(Ordering::SeqCst)
    );

    println!("\n=== Repeated request within the window ===");
    let start = std::time::Instant::now();
    client
        .send(&RequestDescriptor::get(Url::parse(calls[0])?), None)
        .await?;
    println!("Cached request took: {:?}", start.elapsed());

    println!("\nGuard stats: {:?}", client.guard().stats());

    Ok(())
}
