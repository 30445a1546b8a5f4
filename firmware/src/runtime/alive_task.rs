use embassy_time::{Duration, Ticker, Timer};
use portable_atomic::Ordering;

use enclosure_core::protocol::REPORT_LEN;

use super::{COMMAND_IN_FLIGHT, HEARTBEAT_ENABLED, OUTBOUND_REPORTS};

/// Quiet window after boot before the first keepalive goes out.
const BOOT_QUIET_PERIOD: Duration = Duration::from_secs(8);

/// Interval between keepalive reports once running.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Emits the periodic keepalive report.
///
/// Beats are skipped while the heartbeat is suspended or a command response
/// is pending, so the host never has to disambiguate a keepalive from a
/// reply. A full outbound queue drops the beat rather than waiting.
#[embassy_executor::task]
pub async fn run() -> ! {
    Timer::after(BOOT_QUIET_PERIOD).await;

    let mut ticker = Ticker::every(HEARTBEAT_INTERVAL);
    loop {
        ticker.next().await;

        if !HEARTBEAT_ENABLED.load(Ordering::Relaxed) || COMMAND_IN_FLIGHT.load(Ordering::Relaxed)
        {
            continue;
        }

        if OUTBOUND_REPORTS.try_send([0xFF; REPORT_LEN]).is_err() {
            defmt::debug!("alive: outbound queue full, skipping beat");
        }
    }
}
