use crate::error::ConnectorError;
use futures_util::{StreamExt, stream};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast,
};
use tokio_postgres::{AsyncMessage, Client, Config, Connection, NoTls, Notification, config::SslMode};
use tracing::{debug, error, warn};

pub(crate) fn parse_config(url: &str) -> Result<Config, ConnectorError> {
    url.parse::<Config>()
        .map_err(|e| ConnectorError::InvalidUrl(e.to_string()))
}

/// Opens a client, honouring the URL's `sslmode`. When `notifications` is
/// given, every `NOTIFY` delivered to this session is forwarded there.
pub(crate) async fn connect_client(
    config: &Config,
    notifications: Option<broadcast::Sender<Notification>>,
) -> Result<Client, ConnectorError> {
    match config.get_ssl_mode() {
        SslMode::Disable => connect_without_tls(config, notifications).await,
        SslMode::Prefer => match connect_with_tls(config, notifications.clone()).await {
            Ok(client) => Ok(client),
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS");
                connect_without_tls(config, notifications).await
            }
        },
        _ => connect_with_tls(config, notifications).await,
    }
}

async fn connect_with_tls(
    config: &Config,
    notifications: Option<broadcast::Sender<Notification>>,
) -> Result<Client, ConnectorError> {
    let connector = TlsConnector::builder().build()?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config.connect(tls).await?;
    spawn_connection(connection, notifications);
    Ok(client)
}

async fn connect_without_tls(
    config: &Config,
    notifications: Option<broadcast::Sender<Notification>>,
) -> Result<Client, ConnectorError> {
    let (client, connection) = config.connect(NoTls).await?;
    spawn_connection(connection, notifications);
    Ok(client)
}

/// Drives the connection until it closes.
fn spawn_connection<S, T>(
    mut connection: Connection<S, T>,
    notifications: Option<broadcast::Sender<Notification>>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut messages = stream::poll_fn(move |cx| connection.poll_message(cx));
        while let Some(message) = messages.next().await {
            match message {
                Ok(AsyncMessage::Notification(notification)) => {
                    if let Some(sender) = &notifications {
                        // No receivers just means nobody is waiting right now.
                        let _ = sender.send(notification);
                    }
                }
                Ok(AsyncMessage::Notice(notice)) => {
                    debug!(notice = %notice.message(), "Postgres notice");
                }
                Ok(_) => {}
                Err(err) => {
                    error!(%err, "Postgres connection error");
                    break;
                }
            }
        }
    });
}
