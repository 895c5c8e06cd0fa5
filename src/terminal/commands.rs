//! Command line parsing for the terminal client

use thiserror::Error;

use talk::shared::RoomId;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SignUp { email: String, password: String },
    SignIn { email: String, password: String },
    SignOut,
    ForgotPassword { email: String },
    Recover { link: String },
    NewPassword { password: String, confirmation: String },
    Rooms,
    Join { room_id: RoomId },
    Create { name: String },
    Leave,
    WhoAmI,
    Help,
    Quit,
    /// Plain text, sent to the current room
    Say(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command /{0}, try /help")]
    Unknown(String),
}

pub const HELP: &str = "\
/signup <email> <mot de passe>      créer un compte
/login <email> <mot de passe>       se connecter
/logout                             se déconnecter
/forgot <email>                     recevoir un lien de réinitialisation
/recover <lien>                     ouvrir le lien reçu par mail
/password <nouveau> <confirmation>  changer le mot de passe
/rooms                              lister les salons
/join <id>                          rejoindre un salon
/create <nom>                       créer un salon
/leave                              quitter le salon
/whoami                             utilisateur et salon courants
/help                               cette aide
/quit                               quitter
Tout autre texte est envoyé dans le salon courant.";

/// Parse one input line
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let words: Vec<&str> = args.split_whitespace().collect();

    match name {
        "signup" => match words.as_slice() {
            [email, password] => Ok(Command::SignUp {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => Err(CommandError::Usage("/signup <email> <mot de passe>")),
        },
        "login" => match words.as_slice() {
            [email, password] => Ok(Command::SignIn {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => Err(CommandError::Usage("/login <email> <mot de passe>")),
        },
        "logout" => Ok(Command::SignOut),
        "forgot" => match words.as_slice() {
            [email] => Ok(Command::ForgotPassword {
                email: email.to_string(),
            }),
            _ => Err(CommandError::Usage("/forgot <email>")),
        },
        "recover" => match words.as_slice() {
            [link] => Ok(Command::Recover {
                link: link.to_string(),
            }),
            _ => Err(CommandError::Usage("/recover <lien>")),
        },
        "password" => match words.as_slice() {
            [password, confirmation] => Ok(Command::NewPassword {
                password: password.to_string(),
                confirmation: confirmation.to_string(),
            }),
            _ => Err(CommandError::Usage("/password <nouveau> <confirmation>")),
        },
        "rooms" => Ok(Command::Rooms),
        "join" => words
            .first()
            .and_then(|id| id.parse().ok())
            .filter(|_| words.len() == 1)
            .map(|room_id| Command::Join { room_id })
            .ok_or(CommandError::Usage("/join <id>")),
        // Room names may contain spaces
        "create" if !args.is_empty() => Ok(Command::Create {
            name: args.to_string(),
        }),
        "create" => Err(CommandError::Usage("/create <nom>")),
        "leave" => Ok(Command::Leave),
        "whoami" => Ok(Command::WhoAmI),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}
