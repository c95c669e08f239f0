use std::time::Duration;

#[cfg(feature = "tokio")]
pub(crate) async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(all(feature = "smol", not(feature = "tokio")))]
pub(crate) async fn sleep(duration: Duration) {
    smol::Timer::after(duration).await;
}
