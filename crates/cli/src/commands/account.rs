//! Sign-in, sign-out and profile commands.

use std::io::{BufRead, Write};

use storefront_session::{Registration, SessionClient, UserProfile};

use super::CommandError;

/// Details for `register`, as collected from the command line.
#[derive(Debug)]
pub struct NewAccount {
    pub email: String,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub accepts_marketing: bool,
}

/// Sign in and report who we are signed in as.
pub async fn login(
    client: &SessionClient,
    email: &str,
    password: Option<String>,
) -> Result<(), CommandError> {
    let password = password_or_prompt(password)?;
    let user = client.login(email, &password).await?;
    print_signed_in(user.as_ref(), email);
    Ok(())
}

/// Create an account and sign in.
pub async fn register(client: &SessionClient, account: NewAccount) -> Result<(), CommandError> {
    let password = password_or_prompt(account.password)?;
    let registration = Registration {
        email: account.email.clone(),
        password,
        first_name: account.first_name,
        last_name: account.last_name,
        phone: None,
        accepts_marketing: account.accepts_marketing,
    };

    let user = client.register(registration).await?;
    print_signed_in(user.as_ref(), &account.email);
    Ok(())
}

/// Sign out. The local session is gone even if the platform call fails.
pub async fn logout(client: &SessionClient) -> Result<(), CommandError> {
    if !client.has_session() {
        tracing::info!("No stored session");
        return Ok(());
    }
    client.logout().await?;
    tracing::info!("Signed out");
    Ok(())
}

/// Fetch the profile from the platform and print it.
pub async fn whoami(client: &SessionClient) -> Result<(), CommandError> {
    let profile = client.profile().await.map_err(CommandError::from_session)?;
    print_profile(&profile);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_signed_in(user: Option<&UserProfile>, email: &str) {
    match user {
        Some(user) => println!("Signed in as {} ({})", display_name(user), user.id),
        None => println!("Signed in as {email}"),
    }
}

#[allow(clippy::print_stdout)]
fn print_profile(profile: &UserProfile) {
    println!("ID:             {}", profile.id);
    println!("Name:           {}", display_name(profile));
    if let Some(email) = &profile.email {
        let verified = if profile.email_verified { "verified" } else { "unverified" };
        println!("Email:          {email} ({verified})");
    }
    if let Some(phone) = &profile.phone {
        println!("Phone:          {phone}");
    }
    println!(
        "Two-factor:     {}",
        if profile.two_factor_enabled { "on" } else { "off" }
    );
    println!(
        "Marketing:      {}",
        if profile.preferences.accepts_marketing { "opted in" } else { "opted out" }
    );
    if let Some(address) = profile.default_address() {
        println!("Default address: {}", address.formatted_single_line());
    }
}

fn display_name(profile: &UserProfile) -> String {
    let name = profile.full_name();
    if name.is_empty() {
        profile
            .email
            .clone()
            .unwrap_or_else(|| profile.id.to_string())
    } else {
        name
    }
}

/// Use the password given on the command line, else read one line from stdin.
#[allow(clippy::print_stderr)]
fn password_or_prompt(password: Option<String>) -> Result<String, CommandError> {
    if let Some(password) = password {
        return Ok(password);
    }

    eprint!("Password: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_email_then_id() {
        let mut profile = UserProfile::with_id("cust-9");
        assert_eq!(display_name(&profile), "cust-9");

        profile.email = Some("ada@shop.test".to_string());
        assert_eq!(display_name(&profile), "ada@shop.test");

        profile.first_name = Some("Ada".to_string());
        assert_eq!(display_name(&profile), "Ada");
    }

    #[test]
    fn test_password_from_argument() {
        let password = password_or_prompt(Some("from-args".to_string()));
        assert!(matches!(password, Ok(p) if p == "from-args"));
    }
}
