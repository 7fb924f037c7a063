mod cli;
mod commands;
mod output;

use batchelor_client::config::ConnectionSpec;
use batchelor_client::HeadClient;
use batchelor_shared::logging;
use clap::Parser;

use cli::{Cli, Command};

#[tokio::main]
async fn main() {
    logging::init_tracing();

    let cli = Cli::parse();
    let connections = cli
        .connection
        .head_urls
        .iter()
        .map(|url| build_connection(url, &cli.connection))
        .collect();
    let client = HeadClient::new(connections);

    let result = match cli.command {
        Command::SendEvent(args) => commands::send_event(&client, args).await,
        Command::WaitTask(args) => commands::wait_task(&client, args).await,
        Command::CancelTask(args) => commands::cancel_task(&client, args).await,
        Command::SignalTask(args) => commands::signal_task(&client, args).await,
        Command::ShowTask(args) => commands::show_task(&client, args).await,
        Command::ShowTasks(args) => commands::show_tasks(&client, args.state).await,
        Command::ShowEventTypes => commands::show_event_types(&client).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::error(e);
            std::process::exit(1);
        }
    }
}

fn build_connection(url: &str, connection: &cli::ConnectionArgs) -> ConnectionSpec {
    let mut spec = ConnectionSpec::new(url.to_string());
    if let Some(api_key) = &connection.api_key {
        spec = spec.with_api_key(api_key.clone());
    } else if let (Some(user), Some(password)) = (&connection.user, &connection.password) {
        spec = spec.with_basic_auth(user.clone(), password.clone());
    }
    spec
}
