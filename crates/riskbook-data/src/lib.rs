//! Market data sources and the last-known price cache.

mod cache;
mod csv_source;
mod replay;

pub use cache::{PriceCache, SymbolStats};
pub use csv_source::CsvTickSource;
pub use replay::ScriptedSource;

use riskbook_core::PriceTick;
use tokio::sync::mpsc;

/// Stream `ticks` into a bounded channel, keeping only `symbols` (all if empty).
///
/// The sending task stops when the receiver is dropped.
pub(crate) fn spawn_replay(
    ticks: Vec<PriceTick>,
    symbols: &[String],
    pace: Option<std::time::Duration>,
    capacity: usize,
) -> mpsc::Receiver<PriceTick> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let symbols: Vec<String> = symbols.to_vec();

    tokio::spawn(async move {
        for tick in ticks {
            if !symbols.is_empty() && !symbols.iter().any(|s| s == &tick.symbol) {
                continue;
            }
            if tx.send(tick).await.is_err() {
                break;
            }
            if let Some(pace) = pace {
                tokio::time::sleep(pace).await;
            }
        }
        tracing::debug!("Replay finished");
    });

    rx
}
