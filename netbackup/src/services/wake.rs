//! Wake-on-LAN with a fixed boot grace period.

use crate::models::MacAddress;
use crate::transfer::progress::{countdown_bar, format_duration};
use crate::utils::ResolutionError;
use std::time::Duration;

/// Sends a magic packet. Fire-and-forget: success says nothing about the
/// target actually powering on.
#[allow(async_fn_in_trait)]
pub trait WakeSignal {
    async fn send_wake(&self, mac: MacAddress) -> Result<(), ResolutionError>;
}

pub struct WakeOrchestrator<W> {
    sender: W,
    boot_wait: Duration,
    progress_width: usize,
    show_progress: bool,
}

impl<W: WakeSignal> WakeOrchestrator<W> {
    pub fn new(sender: W, boot_wait: Duration) -> Self {
        Self {
            sender,
            boot_wait,
            progress_width: 50,
            show_progress: false,
        }
    }

    /// Render a countdown bar of `width` cells while waiting.
    pub fn with_progress(mut self, enabled: bool, width: usize) -> Self {
        self.show_progress = enabled;
        self.progress_width = width;
        self
    }

    pub fn sender(&self) -> &W {
        &self.sender
    }

    /// Send the wake signal, then sleep for the boot wait. The caller
    /// re-probes afterwards.
    pub async fn wake(&self, mac: MacAddress, address: &str) -> Result<(), ResolutionError> {
        tracing::info!(host = %address, mac = %mac, "Sending Wake-on-LAN signal");
        self.sender.send_wake(mac).await?;

        let total = self.boot_wait.as_secs();
        tracing::info!(host = %address, wait_secs = total, "Waiting for server to boot");

        // Hidden when progress is off; the ticks still pace the wait
        let bar = countdown_bar(total, self.progress_width, self.show_progress);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        for elapsed in 0..=total {
            ticker.tick().await;
            bar.set_position(elapsed);
            bar.set_message(format!("{} left", format_duration(total - elapsed)));
        }
        bar.finish_and_clear();

        Ok(())
    }
}
