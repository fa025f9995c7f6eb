//! Account subcommands

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::{AppConfig, StorageBackend};
use crate::domain::{AccountDetails, Department, PageResult, UserAccount, Validity};
use crate::infrastructure::logging;
use crate::infrastructure::storage::{PostgresMigrator, run_account_migrations};
use crate::infrastructure::user::{CreateAccountRequest, UpdateAccountRequest};

use super::{Command, CreateArgs, UpdateArgs};

/// Account as printed by the CLI; the credential is never shown
#[derive(Debug, Serialize)]
struct AccountView<'a> {
    id: i64,
    username: &'a str,
    email: Option<&'a str>,
    mobile: Option<&'a str>,
    validity: Validity,
    department: Option<&'a Department>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role_ids: Option<Vec<i64>>,
    created_by: Option<&'a str>,
    modified_by: Option<&'a str>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl<'a> AccountView<'a> {
    fn of(user: &'a UserAccount) -> Self {
        Self {
            id: user.id.value(),
            username: &user.username,
            email: user.email.as_deref(),
            mobile: user.mobile.as_deref(),
            validity: user.validity,
            department: user.department.as_ref(),
            role_ids: None,
            created_by: user.created_by.as_deref(),
            modified_by: user.modified_by.as_deref(),
            created_at: user.created_at,
            modified_at: user.modified_at,
        }
    }

    fn with_roles(details: &'a AccountDetails) -> Self {
        Self {
            role_ids: Some(details.role_ids.iter().map(|r| r.value()).collect()),
            ..Self::of(&details.user)
        }
    }
}

fn page_view(page: &PageResult<UserAccount>) -> serde_json::Value {
    let records: Vec<AccountView<'_>> = page.records.iter().map(AccountView::of).collect();

    json!({
        "page_current": page.page_current,
        "page_size": page.page_size,
        "page_count": page.page_count,
        "row_count": page.row_count,
        "records": records,
    })
}

/// First line of `input`, without its line terminator
async fn read_password<R: AsyncBufRead + Unpin>(mut input: R) -> anyhow::Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .await
        .context("Failed to read password from stdin")?;

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run one subcommand to completion
pub async fn run(command: Command) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging);

    let service = match command {
        Command::Migrate => return migrate(&config).await,
        _ => crate::build_account_service(&config).await?,
    };

    match command {
        Command::Show { id } => {
            let details = service.find_account_by_id(id).await?;
            print(&AccountView::with_roles(&details))
        }
        Command::Create(args) => {
            let CreateArgs {
                username,
                email,
                mobile,
                dept_id,
                roles,
                by,
            } = args;
            let password = read_password(BufReader::new(tokio::io::stdin())).await?;

            let request = CreateAccountRequest {
                username,
                password,
                email,
                mobile,
                dept_id,
                created_by: by,
            };

            let created = service.create_account(request, &roles).await?;
            print(&created)
        }
        Command::Update(args) => {
            let UpdateArgs {
                id,
                username,
                email,
                mobile,
                dept_id,
                roles,
                by,
            } = args;

            let request = UpdateAccountRequest {
                id,
                username,
                email,
                mobile,
                dept_id,
                modified_by: by,
            };

            let rows_affected = service.update_account(request, &roles).await?;
            print(&json!({ "id": id, "rows_affected": rows_affected }))
        }
        Command::Enable(args) => {
            let rows_affected = service.set_validity(args.id, 1, &args.by).await?;
            print(&json!({ "id": args.id, "rows_affected": rows_affected }))
        }
        Command::Disable(args) => {
            let rows_affected = service.set_validity(args.id, 0, &args.by).await?;
            print(&json!({ "id": args.id, "rows_affected": rows_affected }))
        }
        Command::List { filter, page } => {
            let result = service.list_accounts(filter.as_deref(), page).await?;
            print(&page_view(&result))
        }
        // Returned before the service is built
        Command::Migrate => Ok(()),
    }
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    if config.storage.backend != StorageBackend::Postgres {
        anyhow::bail!("migrate requires storage.backend = \"postgres\"");
    }

    let pool = crate::connect_postgres(&config.storage).await?;
    let applied = run_account_migrations(&pool).await?;
    let version = PostgresMigrator::new(pool).current_version().await?;

    print(&json!({ "applied": applied, "version": version }))
}
