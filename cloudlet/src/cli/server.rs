use server::error::StartupError;

pub async fn run() -> Result<(), StartupError> {
    server::run().await
}
