//! Reader task: the thread that keeps the dispatcher fed.
//!
//! Runs in a dedicated thread using `edge-executor` for cooperative
//! scheduling and `async-io-mini` timers for idle waits. Two futures:
//!
//! 1. **Read** flushes queued outbound bytes, polls the channel and hands
//!    frames to the dispatcher. It sleeps one poll interval only when
//!    nothing moved, and ends when the link is lost.
//! 2. **Sweep** expires overdue requests once per sweep interval.
//!
//! ```text
//!  ┌──────────────────────────────────────────────┐
//!  │  ril-io thread                               │
//!  │  ┌────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor          │  │
//!  │  │   ┌──────────────┐   ┌─────────────┐   │  │
//!  │  │   │ Read         │   │ Sweep       │   │  │
//!  │  │   │ poll ⏱ idle  │   │ sweep ⏱     │   │  │
//!  │  │   └──────────────┘   └─────────────┘   │  │
//!  │  └────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────┘
//! ```

use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;

use async_io_mini::Timer;
use log::{info, warn};

use crate::error::ChannelError;

use super::dispatch::Dispatcher;
use super::transport::Transport;

/// Reader task timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoTiming {
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
}

impl IoTiming {
    pub fn from_millis(poll_ms: u64, sweep_ms: u64) -> Self {
        Self {
            poll_interval: Duration::from_millis(poll_ms),
            sweep_interval: Duration::from_millis(sweep_ms),
        }
    }
}

/// Read task. Returns once the link is gone.
///
/// Each pass first pushes out any backlog a slow modem left queued, then
/// drains inbound frames.
async fn read_loop<T: Transport>(dispatcher: Arc<Dispatcher<T>>, poll_interval: Duration) {
    loop {
        match pump(&dispatcher) {
            Ok(0) => {
                Timer::after(poll_interval).await;
            }
            // Busy link: let the sweep task in, then go again straight away.
            Ok(_) => futures_lite::future::yield_now().await,
            Err(ChannelError::NotAttached) => {
                info!("IO: link detached, reader stopping");
                return;
            }
            Err(e) => {
                warn!("IO: reader stopping: {}", e);
                return;
            }
        }
    }
}

/// One read pass: frames and bytes moved.
fn pump<T: Transport>(dispatcher: &Dispatcher<T>) -> Result<usize, ChannelError> {
    let flushed = dispatcher.flush_outbound()?;
    Ok(flushed + dispatcher.poll_inbound()?)
}

/// Sweep task. Runs until the executor stops driving it.
async fn sweep_loop<T: Transport>(dispatcher: Arc<Dispatcher<T>>, sweep_interval: Duration) {
    loop {
        Timer::after(sweep_interval).await;
        dispatcher.sweep_expired();
    }
}

fn run_io_loop<T: Transport + 'static>(dispatcher: Arc<Dispatcher<T>>, timing: IoTiming) {
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();

    executor
        .spawn(sweep_loop(dispatcher.clone(), timing.sweep_interval))
        .detach();

    info!(
        "IO task started (poll {:?}, sweep {:?})",
        timing.poll_interval, timing.sweep_interval
    );

    // The sweep task is dropped with the executor once the reader returns.
    futures_lite::future::block_on(executor.run(read_loop(dispatcher, timing.poll_interval)));
    info!("IO task finished");
}

/// Spawn the reader task on its own thread.
pub fn spawn<T: Transport + 'static>(
    dispatcher: Arc<Dispatcher<T>>,
    timing: IoTiming,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("ril-io".into())
        .spawn(move || run_io_loop(dispatcher, timing))
}
