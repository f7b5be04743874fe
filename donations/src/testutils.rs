use crate::platform::{Donation, Platform};

pub fn donation(platform: Platform, donor_name: &str, amount: f64) -> Donation {
    Donation {
        platform,
        donor_name: donor_name.to_string(),
        amount,
        message: String::new(),
        transaction_id: None,
        koin_count: None,
        is_verified: None,
        is_anonymous: None,
    }
}
