//! Demo binary: connects to a local server, runs a handful of commands and a pipeline, and
//! prints what came back. Exercises `Client` end-to-end the way `entangled90-rdis`'s own
//! `main.rs` exercised its engine directly against a socket.

use pyrsedis_core::Client;

fn main() {
    simple_logger::init_with_level(log::Level::Info).expect("failed to start logger");
    tracing_subscriber::fmt::init();

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = match Client::from_url(&url) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("failed to parse {url}: {e}");
            std::process::exit(1);
        }
    };

    match client.ping() {
        Ok(true) => println!("PING -> PONG"),
        Ok(false) => println!("PING -> unexpected reply"),
        Err(e) => {
            eprintln!("PING failed: {e}");
            std::process::exit(1);
        }
    }

    let mut pipeline = client.pipeline();
    pipeline
        .command(&["SET", "pyrsedis:smoke", "1"])
        .command(&["INCR", "pyrsedis:smoke"])
        .command(&["GET", "pyrsedis:smoke"]);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to start a scratch runtime for the pipeline demo");
    match runtime.block_on(pipeline.execute()) {
        Ok(results) => {
            for (i, result) in results.into_iter().enumerate() {
                match result {
                    Ok(value) => println!("pipeline[{i}] -> {value:?}"),
                    Err(e) => println!("pipeline[{i}] -> error: {e}"),
                }
            }
        }
        Err(e) => eprintln!("pipeline failed: {e}"),
    }

    println!(
        "pool: {} idle, {} available",
        client.pool_idle_count(),
        client.pool_available()
    );
}
