//! Donation platforms and the canonical donation record.
//!
//! Every platform owns the list of field aliases its webhooks use for the
//! donor name, amount and message. Parsing takes the first alias with a
//! non-empty raw value and sanitizes only that one, so alias order matters.

mod classify;
mod payload;
pub mod samples;

pub use classify::{
    Classification, RULES, Rule, Stage, Unwrapped, classify, classify_value, unwrap_envelope,
};
pub use payload::Payload;

use crate::sanitize::{DEFAULT_TEXT_LIMIT, MESSAGE_LIMIT};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

pub const ANONYMOUS: &str = "Anonymous";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Saweria,
    Sociabuzz,
    Trakteer,
    Tako,
    Bagibagi,
}

struct Aliases {
    donor_name: &'static [&'static str],
    amount: &'static [&'static str],
    message: &'static [&'static str],
    transaction_id: &'static [&'static str],
}

const SAWERIA: Aliases = Aliases {
    donor_name: &["donator_name", "name"],
    amount: &["amount_raw", "etc.amount_to_display", "amount"],
    message: &["message"],
    transaction_id: &["id"],
};

const SOCIABUZZ: Aliases = Aliases {
    donor_name: &["supporter", "supporter_name", "name"],
    amount: &["amount", "amount_settled", "amount_raw"],
    message: &["message", "supporter_message"],
    transaction_id: &["order_id", "id"],
};

const TRAKTEER: Aliases = Aliases {
    donor_name: &["supporter_name", "name"],
    amount: &["amount", "price"],
    message: &["supporter_message", "message"],
    transaction_id: &["transaction_id", "id"],
};

const TAKO: Aliases = Aliases {
    donor_name: &["supporter_name", "donator_name", "name"],
    amount: &["amount", "amount_raw"],
    message: &["message", "supporter_message"],
    transaction_id: &["id"],
};

const BAGIBAGI: Aliases = Aliases {
    donor_name: &["name", "donor_name", "supporter_name"],
    amount: &["amount", "total"],
    message: &["message", "note"],
    transaction_id: &["transaction_id", "transactionId", "id"],
};

pub(crate) const VERIFIED_FIELDS: &[&str] = &["is_verified", "isVerified"];
pub(crate) const ANONYMOUS_FIELDS: &[&str] = &["is_anonymous", "isAnonymous"];
pub(crate) const KOIN_FIELDS: &[&str] = &["koin", "koin_count", "koinCount"];

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Saweria,
        Platform::Sociabuzz,
        Platform::Trakteer,
        Platform::Tako,
        Platform::Bagibagi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Saweria => "saweria",
            Platform::Sociabuzz => "sociabuzz",
            Platform::Trakteer => "trakteer",
            Platform::Tako => "tako",
            Platform::Bagibagi => "bagibagi",
        }
    }

    /// Exact, case-insensitive lookup by canonical name.
    pub fn from_name(name: &str) -> Option<Platform> {
        let name = name.to_ascii_lowercase();
        Platform::ALL.into_iter().find(|p| p.as_str() == name)
    }

    /// Spellings accepted in a `platform`/`type` discriminator field.
    pub fn discriminator_aliases(&self) -> &'static [&'static str] {
        match self {
            Platform::Saweria => &["saweria"],
            Platform::Sociabuzz => &["sociabuzz", "socia buzz", "socia_buzz"],
            Platform::Trakteer => &["trakteer"],
            Platform::Tako => &["tako"],
            Platform::Bagibagi => &["bagibagi", "bagi-bagi", "bagi bagi", "bagi_bagi"],
        }
    }

    /// Substring of the platform's domain, used for URL hints.
    pub fn domain_fragment(&self) -> &'static str {
        self.as_str()
    }

    fn aliases(&self) -> &'static Aliases {
        match self {
            Platform::Saweria => &SAWERIA,
            Platform::Sociabuzz => &SOCIABUZZ,
            Platform::Trakteer => &TRAKTEER,
            Platform::Tako => &TAKO,
            Platform::Bagibagi => &BAGIBAGI,
        }
    }

    /// Extracts a donation using this platform's aliases. Never fails; a
    /// payload without a usable amount yields `amount == 0`.
    pub fn parse(&self, payload: Payload<'_>) -> Donation {
        let aliases = self.aliases();

        let mut donation = Donation {
            platform: *self,
            donor_name: payload.first_text(aliases.donor_name, DEFAULT_TEXT_LIMIT),
            amount: payload.first_amount(aliases.amount),
            message: payload.first_text(aliases.message, MESSAGE_LIMIT),
            transaction_id: Some(payload.first_text(aliases.transaction_id, DEFAULT_TEXT_LIMIT))
                .filter(|id| !id.is_empty()),
            koin_count: None,
            is_verified: None,
            is_anonymous: None,
        };

        if *self == Platform::Bagibagi {
            donation.koin_count = payload.first_count(KOIN_FIELDS);
            donation.is_verified = payload.first_flag(VERIFIED_FIELDS);
            donation.is_anonymous = payload.first_flag(ANONYMOUS_FIELDS);
        }

        if donation.donor_name.is_empty() || donation.is_anonymous == Some(true) {
            donation.donor_name = ANONYMOUS.to_string();
        }

        donation
    }
}

/// Writes whole amounts as JSON integers (`10000`, not `10000.0`).
/// Amounts are capped at 1e9 by the sanitizer, so the cast is exact.
pub fn serialize_amount<S: Serializer>(amount: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if amount.fract() == 0.0 {
        serializer.serialize_i64(*amount as i64)
    } else {
        serializer.serialize_f64(*amount)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical donation record, immutable once classified.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Donation {
    pub platform: Platform,
    pub donor_name: String,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub koin_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_anonymous: Option<bool>,
}

impl Donation {
    /// Name used for display and duplicate detection, whatever field the
    /// platform stored it under.
    pub fn display_name(&self) -> &str {
        if self.donor_name.is_empty() || self.is_anonymous == Some(true) {
            ANONYMOUS
        } else {
            &self.donor_name
        }
    }

    /// Copy with the donor name and message replaced, used for tenant
    /// display overrides.
    pub fn with_display(&self, donor_name: &str, message: &str) -> Donation {
        Donation {
            donor_name: donor_name.to_string(),
            message: message.to_string(),
            ..self.clone()
        }
    }
}
