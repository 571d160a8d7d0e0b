use std::path::Path;

use tally_core::db::{LibSqlSessionRepository, SessionProvider};
use tally_core::util::normalize_text_option;
use tally_core::User;

use crate::cli::SessionCommands;
use crate::commands::common::open_database;
use crate::error::CliError;

pub async fn run_session(command: SessionCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        SessionCommands::Login { user_id, email } => {
            let user = login(&user_id, email, db_path).await?;
            println!("Signed in as {}", user.id);
            Ok(())
        }
        SessionCommands::Logout => {
            logout(db_path).await?;
            println!("Signed out; sync checkpoint reset");
            Ok(())
        }
    }
}

pub async fn login(
    user_id: &str,
    email: Option<String>,
    db_path: &Path,
) -> Result<User, CliError> {
    let user = User {
        id: user_id.trim().to_string(),
        email: normalize_text_option(email),
    };

    let db = open_database(db_path).await?;
    LibSqlSessionRepository::new(db.connection())
        .set_current_user(&user)
        .await?;
    Ok(user)
}

pub async fn logout(db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    LibSqlSessionRepository::new(db.connection())
        .clear_current_user()
        .await?;
    Ok(())
}
