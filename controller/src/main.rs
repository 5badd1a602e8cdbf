mod accessory;
mod api;
mod app;
mod bus;
mod cache;
mod control_point;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await
}
