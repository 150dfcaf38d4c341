use quickpoll_client::reconciler::{ActionOutcome, LiveHandle, Notification, Scope, ViewState};
use quickpoll_client::{ClientError, ClientState, Config};
use tokio::io::{AsyncBufReadExt, BufReader};

#[macro_use]
extern crate tracing;

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "INFO");
        }
    }
    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ClientError> {
    let config = Config::load()?;
    let client = ClientState::new(config)?;

    if !client.session.read().await.is_authenticated() {
        let (Ok(email), Ok(password)) = (
            std::env::var("QUICKPOLL_EMAIL"),
            std::env::var("QUICKPOLL_PASSWORD"),
        ) else {
            return Err(ClientError::NoViewer);
        };
        client.auth.login(&client.session, &email, &password).await?;
    }

    let scope = match std::env::args().nth(1).as_deref() {
        Some("mine") => Scope::ByViewer,
        _ => Scope::AllPolls,
    };
    let (live, task) = client.live(scope).await;
    let mut state = live.state();
    let mut notifications = live.notifications();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("commands: vote <poll> <option> | like <poll> | create <question>|<opt>|<opt>... | refresh | logout | quit");

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                render(&state.borrow_and_update());
            }
            Ok(note) = notifications.recv() => match note {
                Notification::Success(message) => info!("{message}"),
                Notification::Failure { message, reason, .. } => warn!("{message} ({reason})"),
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_line(&client, &live, line.trim()).await? {
                        break;
                    }
                }
                _ => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    live.shutdown();
    let _ = task.await;
    Ok(())
}

async fn handle_line(client: &ClientState, live: &LiveHandle, line: &str) -> Result<bool, ClientError> {
    let mut parts = line.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match command {
        "vote" => {
            let mut ids = rest.split_whitespace();
            if let (Some(poll), Some(option)) = (ids.next(), ids.next()) {
                report(live.vote(poll.into(), option.into()).await?);
            }
        }
        "like" if !rest.is_empty() => report(live.like(rest.into()).await?),
        "create" => {
            let mut fields = rest.split('|');
            let question = fields.next().unwrap_or_default().to_string();
            let options = fields.map(str::to_string).collect();
            match live.create_poll(question, options).await {
                Ok(poll) => info!(poll_id = %poll.id, "created"),
                Err(e) => warn!("{e}"),
            }
        }
        "refresh" => live.refresh()?,
        "logout" => {
            client.logout(live).await?;
            return Ok(false);
        }
        "quit" | "exit" => return Ok(false),
        "" => {}
        other => warn!("unknown command: {other}"),
    }
    Ok(true)
}

fn report(outcome: ActionOutcome) {
    match outcome {
        ActionOutcome::Pending => info!("sent, waiting for confirmation"),
        ActionOutcome::Ignored(reason) => warn!(?reason, "not sent"),
    }
}

fn render(view: &ViewState) {
    if view.loading {
        info!("loading polls...");
        return;
    }

    for poll in view.store.polls() {
        let liked = if poll.user_has_liked { ", liked" } else { "" };
        println!(
            "[{}] {}  ({} total votes, {} likes{liked})",
            poll.id,
            poll.question,
            poll.total_votes(),
            poll.likes(),
        );
        for option in &poll.options {
            let marker = if poll.user_has_voted.as_ref() == Some(&option.id) {
                "*"
            } else {
                " "
            };
            println!(
                "  {marker} [{}] {:<30} {:>5} {:>6.1}%",
                option.id,
                option.text,
                poll.votes_for(&option.id),
                view.store.derive_percentage(&poll.id, &option.id),
            );
        }
    }
}
