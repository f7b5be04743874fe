//! Representative webhook bodies, used by the test endpoint to exercise
//! the full admission path for a platform.

use super::Platform;
use serde_json::{Value, json};

pub fn sample_payload(platform: Platform) -> Value {
    match platform {
        Platform::Saweria => json!({
            "version": "1.0",
            "donator_name": "Test Saweria",
            "amount_raw": 10000,
            "message": "Test donation"
        }),
        Platform::Sociabuzz => json!({
            "supporter": "Test SociaBuzz",
            "email_supporter": "test@example.com",
            "amount": 15000,
            "currency": "IDR",
            "message": "Test donation",
            "content": {
                "link": "https://sociabuzz.com/test"
            }
        }),
        Platform::Trakteer => json!({
            "type": "trakteer",
            "supporter_name": "Test Trakteer",
            "amount": 20000,
            "supporter_message": "Test donation"
        }),
        Platform::Tako => json!({
            "type": "tako",
            "supporter_name": "Test Tako",
            "amount": 25000,
            "message": "Test donation"
        }),
        Platform::Bagibagi => json!({
            "data": [{
                "transaction_id": "test-transaction",
                "name": "Test BagiBagi",
                "amount": 30000,
                "message": "Test donation",
                "koin": 30,
                "is_verified": true,
                "is_anonymous": false
            }]
        }),
    }
}
