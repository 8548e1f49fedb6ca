//! Station wiring
//!
//! Opens the spool, starts the event sources as background tasks and runs
//! the scheduler on the current task until a termination signal arrives.

use fax_printer::DevicePrinter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::buttons::{ButtonMap, ButtonMonitor, SysfsGpio};
use crate::clock::LocalClock;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::core::{Config, Result};
use crate::netinfo::NetworkInspector;
use crate::printing::{CommandCue, CueWindow, Renderer, Scheduler, SchedulerConfig};
use crate::spool::Spool;
use crate::transport::{BrokerUrl, TransportClient};

const EVENT_CHANNEL_CAPACITY: usize = 16;
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Station {
    config: Config,
}

impl Station {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<()> {
        let config = &self.config;
        let broker_url = BrokerUrl::parse(&config.broker_url)?;
        let spool = Arc::new(Spool::open(&config.spool_dir).await?);

        let shutdown = CancellationToken::new();
        let mut tasks = BackgroundTasks::new(shutdown.clone());

        let (spool_tx, spool_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (button_tx, button_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let transport = TransportClient::new(
            broker_url,
            config.client_id.clone(),
            config.mqtt_qos,
            spool.clone(),
            spool_tx,
        );
        tasks.spawn("transport", TaskKind::Worker, transport.run(tasks.shutdown_token()));

        let buttons = ButtonMap {
            help_pin: config.help_pin,
            status_pin: config.status_pin,
        };
        if config.buttons_enabled {
            let monitor = ButtonMonitor::new(
                SysfsGpio::new(&config.gpio_root),
                buttons.pins(),
                button_tx,
            );
            tasks.spawn("buttons", TaskKind::Listener, monitor.run(tasks.shutdown_token()));
        } else {
            tracing::info!("Buttons disabled");
            drop(button_tx);
        }
        tasks.log_summary();

        let cue = config
            .cue_command
            .as_deref()
            .and_then(|command| CommandCue::parse(command, config.cue_lead()));
        let scheduler = Scheduler::new(
            spool,
            DevicePrinter::new(&config.printer_device),
            Renderer::new(config.profile, config.paper_columns),
            cue,
            Arc::new(LocalClock::new(config.timezone)),
            Arc::new(NetworkInspector::default()),
            SchedulerConfig {
                delivery_mode: config.delivery_mode,
                retry_interval: config.retry_interval(),
                buttons,
                cue_window: CueWindow::new(config.cue_start_hour, config.cue_end_hour),
                ..SchedulerConfig::default()
            },
            shutdown.clone(),
        );

        let run = scheduler.run(spool_rx, button_rx);
        tokio::pin!(run);

        tokio::select! {
            _ = &mut run => {
                tracing::warn!("Scheduler stopped on its own");
            }
            _ = shutdown_signal() => {
                tracing::info!("Shutting down...");
                shutdown.cancel();
                // Let the in-flight print finish, but not forever
                match tokio::time::timeout(config.shutdown_timeout(), &mut run).await {
                    Ok(_) => tracing::info!("Scheduler drained"),
                    Err(_) => tracing::warn!(
                        timeout_ms = config.shutdown_timeout_ms,
                        "Print still in progress at shutdown timeout"
                    ),
                }
            }
        }

        tasks.shutdown(TASK_STOP_TIMEOUT).await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
