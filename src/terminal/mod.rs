//! Interactive publish loop.
//!
//! Prompts for a line, publishes it to the session topic, and repeats until
//! the operator enters a blank line (or input ends), at which point the
//! session is disconnected exactly once.

use crate::config::MqttlineConfig;
use crate::mqtt::{parse_qos, Connection, ConsoleHandler, Session};
use anyhow::{Context, Result};
use rumqttc::QoS;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

pub const PROMPT: &str = "Enter a message to publish or a blank line to finish:";
pub const FAREWELL: &str = "Bye!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub published: usize,
    pub failed: usize,
}

pub struct Terminal<R, W> {
    input: R,
    output: W,
    topic: String,
    qos: QoS,
}

impl<R, W> Terminal<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W, topic: impl Into<String>, qos: QoS) -> Self {
        Self {
            input,
            output,
            topic: topic.into(),
            qos,
        }
    }

    /// Subscribes to the topic, then runs the prompt loop until a blank line.
    pub async fn run<S: Session + ?Sized>(&mut self, session: &S) -> Result<RunSummary> {
        let subscribed = session
            .subscribe(&self.topic, self.qos)
            .await
            .with_context(|| format!("Failed to subscribe to topic '{}'", self.topic));

        let summary = match subscribed {
            Ok(()) => self.prompt_loop(session).await,
            Err(e) => Err(e),
        };
        if summary.is_err() {
            // Release the session on the error path too.
            if let Err(e) = session.disconnect().await {
                error!("Failed to disconnect after terminal error: {}", e);
            }
        }
        let summary = summary?;

        self.write_line(FAREWELL).await?;
        self.write_line("").await?;
        Ok(summary)
    }

    async fn prompt_loop<S: Session + ?Sized>(&mut self, session: &S) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut state = DriverState::Running;

        while state == DriverState::Running {
            self.write_line(PROMPT).await?;
            let line = self.read_line().await?;
            self.write_line("").await?;

            match line {
                Some(message) if !message.is_empty() => {
                    match session.publish(&self.topic, &message, self.qos).await {
                        Ok(()) => {
                            debug!("Published {} bytes to '{}'", message.len(), self.topic);
                            summary.published += 1;
                        }
                        Err(e) => {
                            error!("Failed to publish message: {}", e);
                            summary.failed += 1;
                            self.write_line(&format!("Failed to publish message: {}", e))
                                .await?;
                        }
                    }
                }
                _ => {
                    info!("Blank line entered, disconnecting");
                    if let Err(e) = session.disconnect().await {
                        error!("Failed to disconnect: {}", e);
                    }
                    state = DriverState::Done;
                }
            }
        }

        Ok(summary)
    }

    /// Returns `None` at end of input. The trailing line ending is stripped.
    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .await
            .context("Failed to read from terminal")?;
        if read == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    async fn write_line(&mut self, text: &str) -> Result<()> {
        self.output
            .write_all(format!("{}\n", text).as_bytes())
            .await
            .context("Failed to write to terminal")?;
        self.output
            .flush()
            .await
            .context("Failed to flush terminal output")?;
        Ok(())
    }
}

/// Connects with the console handler, runs the prompt loop on stdin/stdout,
/// and returns once the operator is done.
pub async fn run(config: &MqttlineConfig) -> Result<RunSummary> {
    let qos = parse_qos(config.session.qos)?;

    let connection = Connection::connect(&config.broker, Arc::new(ConsoleHandler))
        .await
        .with_context(|| format!("Failed to connect to MQTT broker {}", config.broker.host))?;

    let mut terminal = Terminal::new(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        config.session.topic.clone(),
        qos,
    );

    terminal.run(&connection).await
}
