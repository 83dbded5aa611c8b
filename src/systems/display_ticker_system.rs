use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::accrual::compute_display_value;
use crate::models::MiningSession;
use crate::DISPLAY_TICK_MS;

/// Display refresh ticker. Recomputes the interpolated balance a few times a
/// second and publishes it for the control surface; purely local, no network
/// calls ever happen here.
pub async fn display_ticker_system(
    session_receiver: watch::Receiver<MiningSession>,
    display_sender: watch::Sender<f64>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(DISPLAY_TICK_MS));
    loop {
        ticker.tick().await;
        let session = session_receiver.borrow().clone();
        let value = compute_display_value(&session, Utc::now());
        let _ = display_sender.send(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publishes_the_confirmed_balance_when_idle() {
        let mut idle = MiningSession::idle("u-1".to_string());
        idle.accumulated_tokens = 4.5;
        let (_session_sender, session_receiver) = watch::channel(idle);
        let (display_sender, mut display_receiver) = watch::channel(0.0);
        tokio::spawn(display_ticker_system(session_receiver, display_sender));

        display_receiver.changed().await.unwrap();
        assert_eq!(*display_receiver.borrow(), 4.5);
    }
}
