//! # Session and Sign-Up
//!
//! One active session per ledger. Login matches email or username plus
//! password on an Active account; every failure looks the same to the caller.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

use crate::account::{Account, AccountStatus, Inventory, Stats, UserId, Wallet};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::money::Money;
use crate::referral::record_referral;
use crate::state::LedgerState;

/// Characters used for referral code suffixes.
const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Sign-up form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignUpRequest {
    /// Desired username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Password.
    pub password: String,
    /// Referral code of the inviting player, if any.
    pub referral_code: Option<String>,
}

impl SignUpRequest {
    /// Builds a request without a referral code.
    #[must_use]
    pub fn new(username: &str, email: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            referral_code: None,
        }
    }

    /// Attaches a referral code. Blank codes are dropped.
    #[must_use]
    pub fn with_referral_code(mut self, code: &str) -> Self {
        let code = code.trim();
        self.referral_code = (!code.is_empty()).then(|| code.to_string());
        self
    }
}

/// What a successful sign-up produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpOutcome {
    /// New account id.
    pub user_id: UserId,
    /// The account's own referral code.
    pub referral_code: String,
    /// Starting balance granted.
    pub bonus: Money,
    /// True if the supplied referral code matched a referrer.
    pub referred: bool,
}

/// Opens a session for the matching Active account.
///
/// # Errors
///
/// Returns `LedgerError::InvalidCredentials` for unknown identifiers, wrong
/// passwords and suspended accounts alike.
pub fn login(state: &mut LedgerState, identifier: &str, password: &str) -> LedgerResult<UserId> {
    let user_id = state
        .users
        .iter()
        .find(|u| (u.email == identifier || u.username == identifier) && u.password == password)
        .filter(|u| u.is_active())
        .map(|u| u.id.clone())
        .ok_or(LedgerError::InvalidCredentials)?;
    state.active_user_id = Some(user_id.clone());
    Ok(user_id)
}

/// Closes the current session. Returns the id that was logged in.
pub fn logout(state: &mut LedgerState) -> Option<UserId> {
    state.active_user_id.take()
}

/// Registers a new account with the signup bonus and links it to its
/// referrer. Does not log the new account in.
///
/// # Errors
///
/// Returns `LedgerError::DuplicateEmail` or `LedgerError::DuplicateUsername`.
pub fn sign_up<R: Rng>(
    state: &mut LedgerState,
    config: &LedgerConfig,
    rng: &mut R,
    request: &SignUpRequest,
    now: DateTime<Utc>,
) -> LedgerResult<SignUpOutcome> {
    if state.user_by_email(&request.email).is_some() {
        return Err(LedgerError::DuplicateEmail);
    }
    if state.user_by_username(&request.username).is_some() {
        return Err(LedgerError::DuplicateUsername);
    }

    let referral_code = unique_referral_code(state, config, rng, &request.username);
    let referred_by = request
        .referral_code
        .as_deref()
        .filter(|code| state.user_by_referral_code(code).is_some())
        .map(str::to_string);

    let user_id = state.next_id("USR");
    state.users.push(Account {
        id: user_id.clone(),
        username: request.username.clone(),
        email: request.email.clone(),
        password: request.password.clone(),
        referral_code: referral_code.clone(),
        status: AccountStatus::Active,
        wallet: Wallet {
            balance: config.signup_bonus,
            total_deposits: Money::ZERO,
        },
        inventory: Inventory::default(),
        referrals: Vec::new(),
        stats: Stats::default(),
        referred_by: referred_by.clone(),
        withdrawal_unlock_time: None,
        created_at: now,
    });

    let referred = match referred_by.as_deref() {
        Some(code) => record_referral(state, code, &request.username, now)?,
        None => false,
    };

    Ok(SignUpOutcome {
        user_id,
        referral_code,
        bonus: config.signup_bonus,
        referred,
    })
}

/// Uppercased username followed by a random base-36 suffix, redrawn until
/// no other account holds it.
fn unique_referral_code<R: Rng>(
    state: &LedgerState,
    config: &LedgerConfig,
    rng: &mut R,
    username: &str,
) -> String {
    let prefix = username.to_uppercase();
    loop {
        let suffix: String = (0..config.referral_code_suffix_len)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        let code = format!("{prefix}{suffix}");
        if state.user_by_referral_code(&code).is_none() {
            return code;
        }
        tracing::debug!("referral code {code} taken, drawing again");
    }
}
