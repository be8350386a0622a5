use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};

use crate::{config::Config, delivery::Delivery, error::TransportError, storage::Store};

use super::{
    response::Response,
    state_machine::{Reply, StateMachine},
    transport::LineTransport,
};

/// SMTP server
///
/// Handles one client connection and hands completed messages to delivery.
pub struct Server<S> {
    transport: LineTransport<S>,
    state_machine: StateMachine,
    delivery: Arc<Delivery>,
    peer: String,
}

impl<S: AsyncRead + AsyncWrite> Server<S> {
    /// Create a new server from connected stream
    pub fn new(
        config: &Config,
        delivery: Arc<Delivery>,
        stream: S,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            transport: LineTransport::new(stream, config.max_line_length, config.idle_timeout),
            state_machine: StateMachine::new(&config.hostname, config.max_message_size),
            delivery,
            peer: peer.into(),
        }
    }

    /// Run the server loop
    ///
    /// Accept and handle SMTP commands until QUIT, EOF or a transport
    /// failure. A DATA transfer cut short is discarded.
    pub async fn serve(mut self) -> Result<()> {
        self.transport
            .write_response(&self.state_machine.greeting())
            .await?;

        loop {
            let reply = match self.transport.read_line().await {
                Ok(line) => self.state_machine.handle_smtp(&line),
                Err(TransportError::LineTooLong { max }) => {
                    tracing::warn!("Discarded line longer than {} bytes from {}", max, self.peer);
                    self.state_machine.reject_long_line(max)
                }
                Err(TransportError::Closed) => {
                    tracing::info!("Received EOF from {}", self.peer);
                    self.state_machine.abort_data();
                    return Ok(());
                }
                Err(TransportError::Timeout(idle)) => {
                    tracing::info!("Closing idle connection from {} after {:?}", self.peer, idle);
                    self.state_machine.abort_data();
                    self.transport.write_response(&Response::timeout()).await.ok();
                    return Ok(());
                }
                Err(e) => {
                    self.state_machine.abort_data();
                    return Err(e).with_context(|| format!("reading from {}", self.peer));
                }
            };

            if !self.dispatch(reply).await? {
                break;
            }
        }

        self.transport.shutdown().await.ok();
        Ok(())
    }

    /// Act on a reply; `false` once the connection should close.
    async fn dispatch(&mut self, reply: Reply) -> Result<bool, TransportError> {
        match reply {
            Reply::Respond(response) => self.transport.write_response(&response).await?,
            Reply::Wait => tracing::trace!("Not responding, awaiting more data"),
            Reply::Deliver(mail) => {
                let (response, _) = self.delivery.deliver(mail, &self.peer).await;
                self.transport.write_response(&response).await?;
            }
            Reply::Quit(response) => {
                self.transport.write_response(&response).await?;
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Bind the configured address and serve connections forever.
pub async fn listen(config: Config) -> Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    run(listener, Arc::new(config)).await
}

/// Accept connections on `listener`, one task per connection.
pub async fn run(listener: TcpListener, config: Arc<Config>) -> Result<()> {
    let delivery = Arc::new(Delivery::new(
        Store::from_config(&config),
        &config.hostname,
    ));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!("Error accepting connection: {}", e);
                continue;
            }
        };
        tracing::info!("Accepted connection from {}", peer);

        let server = Server::new(&config, delivery.clone(), stream, peer.to_string());
        tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                tracing::error!("Connection from {} failed: {:#}", peer, e);
            }
        });
    }
}
