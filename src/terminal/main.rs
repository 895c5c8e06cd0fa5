/**
 * Talk Terminal Client - Main Entry Point
 *
 * Line-oriented chat client. Commands start with `/`, anything else is sent to
 * the current room. Toasts and new messages are printed as they arrive.
 */
mod commands;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use talk::client::{ChatContext, SendOutcome, SkipReason, SyncState, SyncView};
use talk::remote::supabase::SupabaseClient;
use talk::shared::{AppConfig, AppView, TalkError, ToastLevel, UiEvent};

use commands::{Command, HELP};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    // Logs go to stderr and stay quiet by default so the chat remains readable
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::var("TALK_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?,
        Err(_) => AppConfig::from_env()?,
    };
    tracing::info!("Connecting to {}", config.backend_url);

    let client = Arc::new(SupabaseClient::new(config.clone()));
    let refresher = client.spawn_auto_refresh();
    let context = ChatContext::new(&config, client);

    let listener = context.auth().listen().await;
    let sync = context.spawn_synchronizer();
    let printer = spawn_printer(context.notifications(), sync.view());

    match context.session().identity() {
        Some(identity) => println!("Connecté en tant que {}", identity.email),
        None => println!("Bienvenue sur Talk. /login <email> <mot de passe> pour commencer, /help pour l'aide."),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match commands::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => run_command(&context, command).await,
            Err(e) => println!("{}", e),
        }
    }

    printer.abort();
    sync.shutdown().await;
    listener.stop().await;
    refresher.abort();
    Ok(())
}

async fn run_command(context: &ChatContext, command: Command) {
    let auth = context.auth();
    let rooms = context.rooms();
    // Sign-in failures are never toasted
    let inline_errors = matches!(command, Command::SignIn { .. });

    let outcome: Result<(), TalkError> = match command {
        Command::SignUp { email, password } => auth.sign_up(&email, &password).await,
        Command::SignIn { email, password } => auth.sign_in(&email, &password).await,
        Command::SignOut => auth.sign_out().await,
        Command::ForgotPassword { email } => auth.request_password_reset(&email).await,
        Command::Recover { link } => auth.open_recovery_link(&link).await,
        Command::NewPassword {
            password,
            confirmation,
        } => {
            if password != confirmation {
                println!("Les mots de passe ne correspondent pas");
                Ok(())
            } else {
                auth.complete_password_reset(&password).await
            }
        }
        Command::Rooms => rooms.list_rooms().await.map(|list| {
            println!("Les salons :");
            for room in list {
                println!("  {:>4}  {}", room.id, room.name);
            }
        }),
        Command::Join { room_id } => match rooms.list_rooms().await {
            Ok(list) => {
                match list.into_iter().find(|room| room.id == room_id) {
                    Some(room) => rooms.join_room(room),
                    None => println!("Aucun salon avec l'id {}", room_id),
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        Command::Create { name } => rooms.create_room(&name).await.map(|_| ()),
        Command::Leave => {
            rooms.leave_room();
            println!("Veuillez rejoindre un salon ou créer un salon");
            Ok(())
        }
        Command::WhoAmI => {
            let snapshot = context.session().snapshot();
            let user = snapshot
                .identity
                .map(|i| i.email)
                .unwrap_or_else(|| "non connecté".to_string());
            let room = snapshot
                .current_room
                .map(|r| format!("{} (#{})", r.name, r.id))
                .unwrap_or_else(|| "aucun salon".to_string());
            println!("{} - {}", user, room);
            Ok(())
        }
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::Say(text) => {
            let mut composer = context.composer();
            composer.set_draft(text);
            match composer.send().await {
                Ok(SendOutcome::Sent) | Ok(SendOutcome::Skipped(SkipReason::EmptyDraft)) => Ok(()),
                Ok(SendOutcome::Skipped(SkipReason::NoRoom)) => {
                    println!("Veuillez rejoindre un salon ou créer un salon");
                    Ok(())
                }
                Ok(SendOutcome::Skipped(SkipReason::NotAuthenticated)) => {
                    println!("Connectez-vous d'abord avec /login");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Command::Quit => Ok(()),
    };

    // Other errors were toasted and printed by the printer task
    if let Err(e) = outcome {
        if inline_errors
            || matches!(e, TalkError::Validation { .. } | TalkError::NotAuthenticated)
        {
            println!("{}", e);
        }
    }
}

/// Print toasts, navigation hints and new messages as they arrive
fn spawn_printer(
    mut events: broadcast::Receiver<UiEvent>,
    mut view: watch::Receiver<SyncView>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shown_state = SyncState::Idle;
        let mut shown_messages = 0usize;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => print_event(&event),
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = view.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = view.borrow_and_update().clone();
                    if current.state != shown_state {
                        print_state(&current.state);
                        if current.state.room_id() != shown_state.room_id() {
                            shown_messages = 0;
                        }
                        shown_state = current.state.clone();
                    }
                    if current.messages.len() < shown_messages {
                        shown_messages = 0;
                    }
                    for message in &current.messages[shown_messages..] {
                        let time = message.created_at.with_timezone(&chrono::Local).format("%H:%M");
                        println!("[{}] {}: {}", time, message.email, message.content);
                    }
                    shown_messages = current.messages.len();
                }
            }
        }
    })
}

fn print_event(event: &UiEvent) {
    match event {
        UiEvent::Toast { level, message } => {
            let marker = match level {
                ToastLevel::Success => "✓",
                ToastLevel::Error => "✗",
            };
            println!("{} {}", marker, message);
        }
        UiEvent::Navigate { view } => {
            let hint = match view {
                AppView::Auth => "/login <email> <mot de passe> pour vous connecter",
                AppView::ChatRoom => "Vous pouvez écrire dans le salon",
                AppView::RoomList => "/rooms pour lister les salons",
                AppView::CreateRoom => "/create <nom> pour créer un salon",
                AppView::ResetPassword => "/password <nouveau> <confirmation> pour choisir un nouveau mot de passe",
            };
            println!("→ {}", hint);
        }
    }
}

fn print_state(state: &SyncState) {
    match state {
        SyncState::Idle => {}
        SyncState::Loading { room_id } => println!("Chargement du salon #{} ...", room_id),
        SyncState::Live { room_id } => println!("== salon #{} ==", room_id),
        SyncState::Error { room_id, message } => {
            println!("Salon #{} indisponible: {}", room_id, message)
        }
    }
}
