//! Control channel between the governor and a running loop.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

const RETRIES: usize = 5;

/// Sending methods never block; receiving methods wait for the next signal.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Asks a sleeping loop to run its next cycle now.
    fn wake(&self) -> bool;

    fn on(&self) -> bool;

    fn off(&self) -> bool;

    fn stop(&self) -> bool;

    async fn on_wake(&self);

    async fn on_on(&self);

    async fn on_off(&self);

    async fn on_stop(&self);
}

/// ChanneledTransport implements Transport with one single-slot channel per signal.
pub struct ChanneledTransport {
    wake_tx: mpsc::Sender<()>,
    wake_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    on_tx: mpsc::Sender<()>,
    on_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    off_tx: mpsc::Sender<()>,
    off_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    stop_tx: mpsc::Sender<()>,
    stop_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl ChanneledTransport {
    pub fn new() -> Arc<Self> {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (on_tx, on_rx) = mpsc::channel(1);
        let (off_tx, off_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = mpsc::channel(1);

        Arc::new(Self {
            wake_tx,
            wake_rx: tokio::sync::Mutex::new(wake_rx),
            on_tx,
            on_rx: tokio::sync::Mutex::new(on_rx),
            off_tx,
            off_rx: tokio::sync::Mutex::new(off_rx),
            stop_tx,
            stop_rx: tokio::sync::Mutex::new(stop_rx),
        })
    }

    /// A full slot means the same signal is already pending, which counts as delivered.
    fn try_send(tx: &mpsc::Sender<()>) -> bool {
        for _ in 0..RETRIES {
            match tx.try_send(()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(())) => return true,
                Err(mpsc::error::TrySendError::Closed(())) => return false,
            }
        }
        false
    }

    async fn recv(rx: &tokio::sync::Mutex<mpsc::Receiver<()>>) {
        let mut rx = rx.lock().await;
        if rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl Transport for ChanneledTransport {
    fn wake(&self) -> bool {
        Self::try_send(&self.wake_tx)
    }

    fn on(&self) -> bool {
        Self::try_send(&self.on_tx)
    }

    fn off(&self) -> bool {
        Self::try_send(&self.off_tx)
    }

    fn stop(&self) -> bool {
        Self::try_send(&self.stop_tx)
    }

    async fn on_wake(&self) {
        Self::recv(&self.wake_rx).await
    }

    async fn on_on(&self) {
        Self::recv(&self.on_rx).await
    }

    async fn on_off(&self) {
        Self::recv(&self.off_rx).await
    }

    async fn on_stop(&self) {
        Self::recv(&self.stop_rx).await
    }
}
