#[tokio::main]
async fn main() {
    atp_workflow::init_tracing();
    let settings = atp_workflow::config::Settings::from_env();
    if let Err(e) = atp_workflow::run(settings).await {
        eprintln!("atp-workflow: {e}");
        std::process::exit(1);
    }
}
