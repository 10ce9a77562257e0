/// Engine event messaging
///
/// The engine publishes an [`AudioEvent`] for every observable change: tracks
/// starting, stopping or ending, sound effects finishing, load failures and
/// operations ignored before `enable`. Subscribers receive them over
/// `crossbeam-channel` receivers.
///
/// ```rust,ignore
/// let (rx, _id) = engine.subscribe();
/// while let Ok(event) = rx.recv() {
///     match event {
///         AudioEvent::BgmEnded { name } => tracing::info!("{} finished", name),
///         _ => {}
///     }
/// }
/// ```
pub mod bus;
pub mod events;

pub use bus::{EventBus, SubscriberId};
pub use events::AudioEvent;
