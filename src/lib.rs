pub mod api;
pub mod core;

pub use api::{FrameIndexer, FrameSearch};

/// Installs `android_logger` on Android. Elsewhere the host application
/// picks its own `log` backend.
pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("frame_search"),
        );
    }
}
