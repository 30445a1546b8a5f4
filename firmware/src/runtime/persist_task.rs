use embassy_time::{Duration, Ticker};

use super::EngineMutex;
use crate::hw::SettingsFlash;

/// Debounce between a dirtying write and the flash commit.
const COMMIT_INTERVAL: Duration = Duration::from_secs(1);

/// Flushes dirty settings to the flash page.
///
/// Commits happen at most once per interval so a burst of host writes costs
/// one erase cycle instead of one per key.
#[embassy_executor::task]
pub async fn run(mut flash: SettingsFlash, engine: &'static EngineMutex) -> ! {
    let mut ticker = Ticker::every(COMMIT_INTERVAL);
    loop {
        ticker.next().await;

        let mut engine = engine.lock().await;
        if engine.store().is_dirty() {
            flash.commit(engine.store());
            engine.store_mut().clear_dirty();
            defmt::debug!("persist: settings committed");
        }
    }
}
