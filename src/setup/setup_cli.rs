use clap::{Parser, Subcommand};
use editorial_backend::config::Config;
use editorial_backend::models::db_operations::gateway::RedbGateway;
use editorial_backend::models::db_operations::roles_db_operations::RoleDirectory;
use editorial_backend::models::db_operations::users_db_operations::{self, IdentityStore};
use editorial_backend::models::Role;
use editorial_backend::setup::db_setup;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    /// Manages admin users. Create, list, grant and revoke open the content
    /// database, which allows one process at a time: stop editorial_server
    /// first. Change-password only touches the identity database.
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the identity and content stores. Pass `identity` or `content`
    /// to create only one.
    Setup { db_type: Option<String> },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// Registers a user and grants it the admin role.
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    List,
    Grant {
        #[arg(long)]
        email: String,
    },
    Revoke {
        #[arg(long)]
        email: String,
    },
    ChangePassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        new_password: String,
    },
}

#[derive(Subcommand, Debug)]
enum SessionsAction {
    /// Drops expired and revoked sessions.
    Purge,
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env(&cli.env_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            process::exit(1);
        }
    };

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => match db_type.as_deref() {
                Some("identity") => setup_identity_database(&config),
                Some("content") => setup_content_database(&config),
                Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'identity' or 'content'.", other),
                None => {
                    setup_identity_database(&config);
                    setup_content_database(&config);
                }
            },
        },
        Commands::Admin { action } => {
            let Some(identity) = open_identity(&config) else {
                process::exit(1);
            };
            if let AdminAction::ChangePassword { email, new_password } = action {
                match identity.change_password(email, new_password) {
                    Ok(true) => println!("✅ Password for '{}' changed successfully.", email),
                    Ok(false) => eprintln!("❌ Error: No user with email '{}' found.", email),
                    Err(e) => eprintln!("❌ Error updating password: {}", e),
                }
                return;
            }

            let Some(roles) = open_roles(&config) else {
                process::exit(1);
            };
            match action {
                AdminAction::Create { email, password } => create_admin_user(&identity, &roles, email, password),
                AdminAction::List => list_admin_users(&identity, &roles),
                AdminAction::Grant { email } => set_admin_grant(&identity, &roles, email, true),
                AdminAction::Revoke { email } => set_admin_grant(&identity, &roles, email, false),
                AdminAction::ChangePassword { .. } => {} // handled above
            }
        }
        Commands::Sessions { action } => match action {
            SessionsAction::Purge => {
                let Some(identity) = open_identity(&config) else {
                    process::exit(1);
                };
                match identity.purge_stale_sessions() {
                    Ok(removed) => println!("✅ Removed {} stale session(s).", removed),
                    Err(e) => eprintln!("❌ Error purging sessions: {}", e),
                }
            }
        },
    }
}

fn setup_identity_database(config: &Config) {
    let db_path = config.identity_db_path();
    println!("\nSetting up identity database at '{}'...", db_path.display());

    if let Some(parent_dir) = db_path.parent() {
        if let Err(e) = fs::create_dir_all(parent_dir) {
            eprintln!("❌ Could not create database directory: {}", e);
            return;
        }
    }

    let result = Connection::open(&db_path)
        .map_err(db_setup::SetupError::from)
        .and_then(|mut conn| db_setup::setup_identity_db(&mut conn));
    match result {
        Ok(()) => println!("✅ Identity database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up identity database: {}", e),
    }
}

fn setup_content_database(config: &Config) {
    let db_path = config.content_db_path();
    println!("\nSetting up content database at '{}'...", db_path.display());
    match db_setup::setup_content_db(&db_path) {
        Ok(_) => println!("✅ Content database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up content database: {}", e),
    }
}

fn open_identity(config: &Config) -> Option<IdentityStore> {
    let identity_path = config.identity_db_path();
    if !identity_path.exists() {
        eprintln!("❌ Error: Identity database not found at '{}'. Please run `setup_cli db setup` first.", identity_path.display());
        return None;
    }

    match Pool::builder().max_size(1).build(SqliteConnectionManager::file(&identity_path)) {
        Ok(pool) => Some(IdentityStore::new(pool, config.session_ttl())),
        Err(e) => {
            eprintln!("❌ Could not open identity database: {}", e);
            None
        }
    }
}

fn open_roles(config: &Config) -> Option<RoleDirectory> {
    let content_path = config.content_db_path();
    if !content_path.exists() {
        eprintln!("❌ Error: Content database not found at '{}'. Please run `setup_cli db setup` first.", content_path.display());
        return None;
    }

    match RedbGateway::open(&content_path) {
        Ok(gateway) => Some(RoleDirectory::new(Arc::new(gateway))),
        Err(e) if e.is_store_locked() => {
            eprintln!(
                "❌ Content database '{}' is in use by another process. Stop editorial_server and retry.",
                content_path.display()
            );
            None
        }
        Err(e) => {
            eprintln!("❌ Could not open content database: {}", e);
            None
        }
    }
}

fn create_admin_user(identity: &IdentityStore, roles: &RoleDirectory, email: &str, password: &str) {
    let user = match identity.register_user(email, password) {
        Ok(user) => user,
        Err(e) => {
            eprintln!("❌ Error creating user: {}. It might be because the email already exists.", e);
            return;
        }
    };
    match roles.grant(&user.id, Role::Admin) {
        Ok(_) => println!("✅ Admin user '{}' created successfully.", user.email),
        Err(e) => eprintln!("❌ User '{}' created but the admin grant failed: {}", user.email, e),
    }
}

fn list_admin_users(identity: &IdentityStore, roles: &RoleDirectory) {
    let users = match identity.pool().get().map_err(|e| e.to_string()).and_then(|conn| {
        users_db_operations::read_all_users(&conn).map_err(|e| e.to_string())
    }) {
        Ok(users) => users,
        Err(e) => {
            eprintln!("❌ Error fetching users: {}", e);
            return;
        }
    };

    println!("Listing Admin Users:");
    for user in users {
        match roles.has_role(&user.id, Role::Admin) {
            Ok(true) => println!("- {}", user.email),
            Ok(false) => {}
            Err(e) => eprintln!("❌ Could not read roles for '{}': {}", user.email, e),
        }
    }
}

fn set_admin_grant(identity: &IdentityStore, roles: &RoleDirectory, email: &str, grant: bool) {
    let user = match identity.find_user(email) {
        Ok(Some(user)) => user,
        Ok(None) => {
            eprintln!("❌ Error: No user with email '{}' found.", email);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error looking up user: {}", e);
            return;
        }
    };

    if grant {
        match roles.grant(&user.id, Role::Admin) {
            Ok(_) => println!("✅ '{}' now holds the admin role.", user.email),
            Err(e) => eprintln!("❌ Error granting admin role: {}", e),
        }
    } else {
        match roles.revoke(&user.id, Role::Admin) {
            Ok(0) => println!("ℹ️ '{}' did not hold the admin role.", user.email),
            Ok(_) => println!("✅ Admin role revoked from '{}'.", user.email),
            Err(e) => eprintln!("❌ Error revoking admin role: {}", e),
        }
    }
}
