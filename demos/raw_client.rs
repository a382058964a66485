use pigeon::{metric, Client};

metric!(EXAMPLE_REQUESTS, "pigeon.example.requests", Count);
metric!(EXAMPLE_LATENCY, "pigeon.example.latency", Timing);

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
pub async fn main() {
    // Override for local testing
    std::env::set_var(pigeon::client::STATSD_HOST_ENV, "127.0.0.1");
    let client = Client::from_env("demo").expect("Failed to instantiate client!");
    for i in 0..10 {
        client
            .emit(EXAMPLE_REQUESTS, 1, 1.0)
            .expect("Failed to emit metric!");
        client
            .gauge("pigeon.example.iteration", i, 1.0)
            .expect("Failed to emit metric!");
        client
            .time_future(EXAMPLE_LATENCY.get_name(), 0.5, async {
                tokio::time::sleep(tokio::time::Duration::from_millis(300)).await
            })
            .await;
        println!("Emitted metrics!");
    }
    client.close().expect("Failed to close client!");
}
