//! `chunkflow listen`: prints notifications until Ctrl-C.

use anyhow::Context;
use chunkflow_notify::{NotificationClient, NotifyEvent};
use tracing::{info, warn};

use crate::config::Config;

pub async fn run(config: &Config, owner_id: i64) -> anyhow::Result<()> {
    let mut client = NotificationClient::new(config.notify_config(owner_id)?);
    let mut events = client
        .take_events()
        .context("notification events already taken")?;
    client.connect().await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("disconnecting notification channel");
                client.disconnect().await;
                break;
            }
            _ = client.closed() => break,
            Some(event) = events.recv() => print_event(event),
        }
    }

    while let Ok(event) = events.try_recv() {
        print_event(event);
    }
    Ok(())
}

/// Messages go to stdout as JSON lines; channel lifecycle goes to the log.
fn print_event(event: NotifyEvent) {
    match event {
        NotifyEvent::Message(value) => println!("{value}"),
        NotifyEvent::Opened { endpoint } => info!(endpoint = %endpoint, "listening for notifications"),
        NotifyEvent::Closed { code } => info!(code, "notification channel closed"),
        NotifyEvent::Reconnecting { attempt } => warn!(attempt, "reconnecting notification channel"),
        NotifyEvent::Error(message) => warn!(error = %message, "notification channel error"),
    }
}
