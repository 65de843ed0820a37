//! Operator subcommands of `fitflow_server`.
//!
//! ```text
//! fitflow_server [serve]
//! fitflow_server account create <email> [name]
//! fitflow_server account verify <email>
//! fitflow_server account purchase <email> <basic|pro|enterprise> [subscription|perpetual]
//! fitflow_server session <email>
//! fitflow_server rates refresh
//! ```

use chrono::Utc;

use crate::currency::RateService;
use crate::errors::{LicenseError, LicenseResult};
use crate::plans::{PlanTier, SubscriptionType};
use crate::server::auth::SessionTokens;
use crate::server::license_manager::LicenseManager;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server
    Serve,
    CreateAccount {
        email: String,
        name: Option<String>,
    },
    VerifyEmail {
        email: String,
    },
    Purchase {
        email: String,
        tier: PlanTier,
        subscription_type: SubscriptionType,
    },
    /// Mint a dashboard session token
    Session {
        email: String,
    },
    RefreshRates,
}

fn usage(message: &str) -> LicenseError {
    LicenseError::InvalidRequest(message.to_string())
}

/// Parse `std::env::args()` (program name first).
pub fn parse_command(args: &[String]) -> LicenseResult<Command> {
    let words: Vec<&str> = args.iter().skip(1).map(String::as_str).collect();

    match words.as_slice() {
        [] | ["serve"] => Ok(Command::Serve),
        ["account", "create", email, rest @ ..] => Ok(Command::CreateAccount {
            email: email.to_string(),
            name: (!rest.is_empty()).then(|| rest.join(" ")),
        }),
        ["account", "verify", email] => Ok(Command::VerifyEmail {
            email: email.to_string(),
        }),
        ["account", "purchase", email, tier, rest @ ..] => {
            let subscription_type = match rest {
                [] => SubscriptionType::Subscription,
                [kind] => kind.parse()?,
                _ => return Err(usage("account purchase takes at most one plan type")),
            };
            Ok(Command::Purchase {
                email: email.to_string(),
                tier: tier.parse()?,
                subscription_type,
            })
        }
        ["session", email] => Ok(Command::Session {
            email: email.to_string(),
        }),
        ["rates", "refresh"] => Ok(Command::RefreshRates),
        _ => Err(usage(
            "usage: fitflow_server [serve | account create <email> [name] | account verify <email> \
             | account purchase <email> <tier> [subscription|perpetual] | session <email> | rates refresh]",
        )),
    }
}

/// Run a one-shot command. `Serve` is handled by the caller.
pub async fn execute_command(
    cmd: Command,
    licenses: &LicenseManager,
    sessions: Option<&SessionTokens>,
    rates: &RateService,
) -> LicenseResult<()> {
    let now = Utc::now().naive_utc();

    match cmd {
        Command::Serve => Ok(()),
        Command::CreateAccount { email, name } => {
            let account = licenses
                .register_account(&email, name.as_deref(), now)
                .await?;

            println!("Account created");
            println!("───────────────────────────────────────────");
            println!("ID:          {}", account.id);
            println!("Email:       {}", account.email);
            println!("License key: {}", account.license_key);
            println!("Trial ends:  {}", account.trial_end_at);
            println!("───────────────────────────────────────────");
            println!("Run `account verify {}` before activating devices.", account.email);
            Ok(())
        }
        Command::VerifyEmail { email } => {
            licenses.verify_email(&email, now).await?;
            println!("Email {} verified.", email);
            Ok(())
        }
        Command::Purchase {
            email,
            tier,
            subscription_type,
        } => {
            let account = licenses
                .apply_purchase(&email, tier, subscription_type, now)
                .await?;
            let limit = account
                .device_limit()
                .as_reported()
                .map_or_else(|| "unlimited".to_string(), |n| n.to_string());

            println!("Purchase applied to {}", account.email);
            println!("Plan:    {} ({})", tier, subscription_type);
            println!("Devices: {}", limit);
            if let Some(until) = account.perpetual_updates_until {
                println!("Updates: until {}", until);
            }
            Ok(())
        }
        Command::Session { email } => {
            let sessions = sessions.ok_or_else(|| {
                LicenseError::ConfigError("auth.session_secret is required".to_string())
            })?;
            println!("{}", sessions.issue(&email)?);
            Ok(())
        }
        Command::RefreshRates => {
            let result = rates.refresh().await;
            if result.success {
                println!("Updated {} exchange rates.", result.rates_updated);
                Ok(())
            } else {
                Err(LicenseError::ServerError(
                    "exchange rate refresh failed".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        std::iter::once("fitflow_server")
            .chain(words.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parse_defaults_to_serve() {
        assert_eq!(parse_command(&args(&[])).unwrap(), Command::Serve);
        assert_eq!(parse_command(&args(&["serve"])).unwrap(), Command::Serve);
    }

    #[test]
    fn parse_account_create_with_name() {
        assert_eq!(
            parse_command(&args(&["account", "create", "a@gym.example", "Iron", "Works"])).unwrap(),
            Command::CreateAccount {
                email: "a@gym.example".to_string(),
                name: Some("Iron Works".to_string()),
            }
        );
    }

    #[test]
    fn parse_purchase() {
        assert_eq!(
            parse_command(&args(&["account", "purchase", "a@gym.example", "pro", "perpetual"]))
                .unwrap(),
            Command::Purchase {
                email: "a@gym.example".to_string(),
                tier: PlanTier::Pro,
                subscription_type: SubscriptionType::Perpetual,
            }
        );
        assert!(parse_command(&args(&["account", "purchase", "a@gym.example", "gold"])).is_err());
    }

    #[test]
    fn parse_other_commands() {
        assert_eq!(
            parse_command(&args(&["session", "a@gym.example"])).unwrap(),
            Command::Session {
                email: "a@gym.example".to_string()
            }
        );
        assert_eq!(
            parse_command(&args(&["rates", "refresh"])).unwrap(),
            Command::RefreshRates
        );
        assert!(parse_command(&args(&["token", "list"])).is_err());
    }
}
