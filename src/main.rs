use std::error::Error;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use cotrain_realtime::adapters::WebSocketTransport;
use cotrain_realtime::application::{ConsumerAdapter, SessionPresence, TransportConnection};
use cotrain_realtime::config::{AppConfig, LoggingConfig};
use cotrain_realtime::domain::realtime::events::names;
use cotrain_realtime::domain::realtime::InboundEvent;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.log_level));

    if logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);
    config.validate()?;

    let transport = WebSocketTransport::new(&config.connection.url, &config.connection.namespace)?;
    tracing::info!(endpoint = %transport.endpoint(), "Starting CoTrain realtime client");

    let connection = TransportConnection::new(Arc::new(transport), config.connection_settings());
    if TransportConnection::install_global(connection.clone()).is_err() {
        tracing::warn!("Global connection already installed");
    }

    let Some(identity) = config.identity.identity() else {
        tracing::warn!("No identity configured, set COTRAIN_REALTIME__IDENTITY__WALLET_ADDRESS");
        return Ok(());
    };

    let _state = connection.on_state_change(|state| {
        match &state.last_error {
            Some(error) => tracing::warn!(status = %state.status, attempt = state.attempt, error = %error, "Connection state changed"),
            None => tracing::info!(status = %state.status, attempt = state.attempt, "Connection state changed"),
        }
        Ok(())
    });

    let _notifications = [names::NOTIFICATION, names::ANNOUNCEMENT].map(|event_name| {
        connection.on(event_name, |event| {
            match event {
                InboundEvent::Notification(n) => {
                    tracing::info!(kind = ?n.kind, title = %n.title, message = %n.message, "Notification")
                }
                InboundEvent::Announcement(a) => {
                    tracing::info!(kind = ?a.kind, title = %a.title, message = %a.message, "Announcement")
                }
                _ => {}
            }
            Ok(())
        })
    });

    let presence_settings = config.presence.settings();
    let presences: Vec<SessionPresence> = config
        .identity
        .session_ids()
        .into_iter()
        .map(|session_id| SessionPresence::mount(connection.clone(), session_id, presence_settings))
        .collect();

    connection.connect(identity);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");

    for presence in &presences {
        let view = presence.view();
        tracing::info!(
            session_id = %view.session_id,
            participant_count = view.participant_count,
            "Leaving session"
        );
        presence.teardown();
    }
    connection.disconnect();

    Ok(())
}
