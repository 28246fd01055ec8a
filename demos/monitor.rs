use std::env;

use tuya_cloud::{Bridge, DeviceCatalog, MessageLogMode, Secrets};

#[tokio::main]
async fn main() -> tuya_cloud::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let (Some(secrets_path), Some(devices_path)) = (args.get(1), args.get(2)) else {
        eprintln!("usage: monitor <secrets.yaml> <devices.yaml|devices/> [--log <file>]");
        std::process::exit(2);
    };
    let log_path = args
        .iter()
        .position(|a| a == "--log")
        .and_then(|i| args.get(i + 1));

    let secrets = Secrets::load(secrets_path).await?;
    let catalog = DeviceCatalog::load(devices_path).await?;
    println!(
        "Loaded {} device(s) from {devices_path}",
        catalog.enabled().count()
    );

    let mut builder = Bridge::builder(secrets, catalog).on_update(|update| {
        println!(
            "[{}] {} ({}) = {}",
            update.device_id,
            update.unique_id,
            update.kind.as_str(),
            update.value
        );
    });
    if let Some(path) = log_path {
        builder = builder.message_log(MessageLogMode::Diffed, path);
    }

    let bridge = builder.start().await?;
    println!("Polling. Ctrl-C to stop.");

    let _ = tokio::signal::ctrl_c().await;
    bridge.shutdown().await;
    Ok(())
}
