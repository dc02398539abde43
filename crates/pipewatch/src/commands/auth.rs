//! Session and health command handlers.

use std::io::{self, BufRead};

use pipewatch_config::Config;
use pipewatch_core::{CoreError, Dashboard, UserProfile};
use secrecy::SecretString;

use crate::cli::{GlobalOpts, LoginArgs};
use crate::error::CliError;
use crate::output;

fn detail(user: &UserProfile) -> String {
    [
        format!("Username: {}", user.username),
        format!("ID:       {}", output::or_dash(user.id.as_deref())),
        format!("Email:    {}", output::or_dash(user.email.as_deref())),
        format!("Role:     {}", output::or_dash(user.role.as_deref())),
    ]
    .join("\n")
}

pub async fn health(dashboard: &Dashboard, global: &GlobalOpts) -> Result<(), CliError> {
    let status = dashboard.api().health().await?;
    let out = output::render_single(
        &global.output,
        &status,
        |s| format!("Status: {}", s.status.as_deref().unwrap_or("ok")),
        |s| s.status.clone().unwrap_or_else(|| "ok".into()),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn login(
    dashboard: &Dashboard,
    args: LoginArgs,
    config: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let username = args
        .username
        .or_else(|| config.username.clone())
        .ok_or_else(|| CliError::Usage {
            field: "username".into(),
            reason: "pass a username or set one with: pipewatch config set-user".into(),
        })?;
    let password = read_password(args.password_stdin)?;

    let user = dashboard
        .login(&username, &password)
        .await
        .map_err(|err| match err {
            CoreError::Api(api) if matches!(api.status(), Some(400 | 401)) => {
                CliError::LoginFailed {
                    detail: api.detail(),
                }
            }
            other => other.into(),
        })?;
    let name = user.as_ref().map_or(username.as_str(), |u| u.username.as_str());
    output::print_output(&format!("Logged in as {name}"), global.quiet);
    Ok(())
}

pub async fn logout(dashboard: &Dashboard, global: &GlobalOpts) -> Result<(), CliError> {
    dashboard.logout().await;
    output::print_output("Logged out", global.quiet);
    Ok(())
}

pub async fn whoami(dashboard: &Dashboard, global: &GlobalOpts) -> Result<(), CliError> {
    if !dashboard.is_authenticated() {
        return Err(CliError::AuthRequired {
            detail: "no stored session".into(),
        });
    }
    let user = dashboard.api().current_user().await?;
    let out = output::render_single(&global.output, &user, detail, |u| u.username.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn read_password(from_stdin: bool) -> Result<SecretString, CliError> {
    let password = if from_stdin {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        line.trim_end_matches(['\r', '\n']).to_owned()
    } else {
        rpassword::prompt_password("Password: ")?
    };
    if password.is_empty() {
        return Err(CliError::Usage {
            field: "password".into(),
            reason: "must not be empty".into(),
        });
    }
    Ok(SecretString::from(password))
}
