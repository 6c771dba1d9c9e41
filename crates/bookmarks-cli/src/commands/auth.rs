//! Sign-in command handlers

use anyhow::{bail, Context, Result};

use bookmarks_core::auth::{handle_callback, AUTH_FAILED_PATH};
use bookmarks_core::backend::LOGIN_CODE_TTL_SECS;
use bookmarks_core::{AuthProvider, Config, LocalAuth};

use crate::output::{Output, OutputFormat};

/// Issue a one-time login code
pub fn login_code(
    auth: &LocalAuth,
    email: &str,
    name: Option<&str>,
    output: &Output,
) -> Result<()> {
    if let Some(user) = auth.current_user().context("Failed to read session")? {
        output.message(&format!(
            "Already signed in as {}. Run `bookmarks logout` first.",
            user.display_name()
        ));
        return Ok(());
    }

    let code = auth
        .issue_code(email.trim(), name)
        .context("Failed to issue login code")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "email": email.trim(),
                    "code": code,
                    "expires_in_secs": LOGIN_CODE_TTL_SECS
                })
            );
        }
        OutputFormat::Quiet => println!("{}", code),
        OutputFormat::Human => {
            println!("Login code for {}: {}", email.trim(), code);
            println!();
            println!("Valid for {} minutes. Complete sign-in with:", LOGIN_CODE_TTL_SECS / 60);
            println!("  bookmarks login callback --code {}", code);
        }
    }

    Ok(())
}

/// Complete sign-in with a login code
pub fn login_callback(
    auth: &LocalAuth,
    config: &Config,
    code: Option<&str>,
    next: Option<&str>,
    output: &Output,
) -> Result<()> {
    let target = handle_callback(auth, &config.site_origin, code, next);
    let signed_in = !target.ends_with(AUTH_FAILED_PATH);

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({"signed_in": signed_in, "redirect": target})
            );
        }
        OutputFormat::Quiet => println!("{}", target),
        OutputFormat::Human => {
            if signed_in {
                if let Some(user) = auth.current_user()? {
                    println!("✓ Signed in as {}", user.display_name());
                }
            }
            println!("Redirect: {}", target);
        }
    }

    if !signed_in {
        bail!("Sign-in failed: the login code is missing, invalid or expired");
    }
    Ok(())
}

/// Sign out
pub fn logout(auth: &LocalAuth, output: &Output) -> Result<()> {
    auth.sign_out().context("Failed to sign out")?;
    output.success("Signed out");
    Ok(())
}

/// Show the signed-in user
pub fn whoami(auth: &LocalAuth, output: &Output) -> Result<()> {
    match auth.current_user().context("Failed to read session")? {
        Some(user) => output.print_user(&user),
        None => match output.format {
            OutputFormat::Json => println!("{}", serde_json::json!({"signed_in": false})),
            OutputFormat::Quiet => {}
            OutputFormat::Human => println!("Not signed in"),
        },
    }
    Ok(())
}
