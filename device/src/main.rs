mod api;
mod host;
mod net;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
