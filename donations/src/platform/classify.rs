use super::{ANONYMOUS_FIELDS, Donation, KOIN_FIELDS, Payload, Platform, VERIFIED_FIELDS};
use serde_json::Value;

/// Where a rule sits in the cascade. Earlier stages are more specific.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Fingerprint,
    Discriminator,
    RequiredFields,
    UrlHint,
    LinkHint,
    LooseFallback,
}

#[derive(Clone, Copy)]
enum Check {
    /// `platform` or `type` names the rule's platform.
    Discriminator,
    /// `url` contains the rule's domain fragment.
    Url,
    /// `content.link` contains the rule's domain fragment.
    Link,
    Fields(fn(&Payload<'_>) -> bool),
}

/// One step of the classification cascade.
pub struct Rule {
    pub name: &'static str,
    pub stage: Stage,
    pub platform: Platform,
    check: Check,
}

impl Rule {
    const fn new(name: &'static str, stage: Stage, platform: Platform, check: Check) -> Self {
        Rule {
            name,
            stage,
            platform,
            check,
        }
    }

    pub fn matches(&self, payload: &Payload<'_>) -> bool {
        match self.check {
            Check::Discriminator => discriminator(payload).is_some_and(|value| {
                self.platform
                    .discriminator_aliases()
                    .iter()
                    .any(|alias| value.contains(alias))
            }),
            Check::Url => payload.contains("url", self.platform.domain_fragment()),
            Check::Link => payload.contains("content.link", self.platform.domain_fragment()),
            Check::Fields(check) => check(payload),
        }
    }
}

/// Classification rules, evaluated in order; the first match wins.
///
/// Reordering changes which platform claims ambiguous payloads.
pub static RULES: &[Rule] = &[
    Rule::new(
        "bagibagi.fingerprint",
        Stage::Fingerprint,
        Platform::Bagibagi,
        Check::Fields(has_bagibagi_fingerprint),
    ),
    Rule::new("explicit.sociabuzz", Stage::Discriminator, Platform::Sociabuzz, Check::Discriminator),
    Rule::new("explicit.trakteer", Stage::Discriminator, Platform::Trakteer, Check::Discriminator),
    Rule::new("explicit.tako", Stage::Discriminator, Platform::Tako, Check::Discriminator),
    Rule::new("explicit.saweria", Stage::Discriminator, Platform::Saweria, Check::Discriminator),
    Rule::new("explicit.bagibagi", Stage::Discriminator, Platform::Bagibagi, Check::Discriminator),
    Rule::new(
        "fields.saweria",
        Stage::RequiredFields,
        Platform::Saweria,
        Check::Fields(|p| p.is_truthy("version") && p.is_truthy("donator_name")),
    ),
    Rule::new(
        "fields.sociabuzz",
        Stage::RequiredFields,
        Platform::Sociabuzz,
        Check::Fields(|p| {
            p.is_truthy("supporter")
                && (p.is_truthy("email_supporter") || p.str_eq("currency", "IDR"))
        }),
    ),
    Rule::new("url.sociabuzz", Stage::UrlHint, Platform::Sociabuzz, Check::Url),
    Rule::new("url.trakteer", Stage::UrlHint, Platform::Trakteer, Check::Url),
    Rule::new("url.saweria", Stage::UrlHint, Platform::Saweria, Check::Url),
    Rule::new("url.tako", Stage::UrlHint, Platform::Tako, Check::Url),
    Rule::new("url.bagibagi", Stage::UrlHint, Platform::Bagibagi, Check::Url),
    Rule::new("link.sociabuzz", Stage::LinkHint, Platform::Sociabuzz, Check::Link),
    Rule::new("link.trakteer", Stage::LinkHint, Platform::Trakteer, Check::Link),
    Rule::new("link.saweria", Stage::LinkHint, Platform::Saweria, Check::Link),
    Rule::new("link.tako", Stage::LinkHint, Platform::Tako, Check::Link),
    Rule::new("link.bagibagi", Stage::LinkHint, Platform::Bagibagi, Check::Link),
    // Loose fallbacks are heuristics, not schema matches. Each one refuses
    // payloads carrying any bagibagi marker so it cannot claim a payload the
    // fingerprint stage already passed over.
    Rule::new(
        "loose.trakteer_price",
        Stage::LooseFallback,
        Platform::Trakteer,
        Check::Fields(|p| {
            !has_bagibagi_marker(p) && p.is_truthy("supporter_name") && p.is_truthy("price")
        }),
    ),
    Rule::new(
        "loose.sociabuzz_supporter",
        Stage::LooseFallback,
        Platform::Sociabuzz,
        Check::Fields(|p| {
            !has_bagibagi_marker(p) && p.is_truthy("supporter") && p.is_truthy("amount")
        }),
    ),
    Rule::new(
        "loose.saweria_donator",
        Stage::LooseFallback,
        Platform::Saweria,
        Check::Fields(|p| !has_bagibagi_marker(p) && p.is_truthy("donator_name")),
    ),
    Rule::new(
        "loose.trakteer_supporter_name",
        Stage::LooseFallback,
        Platform::Trakteer,
        Check::Fields(|p| !has_bagibagi_marker(p) && p.is_truthy("supporter_name")),
    ),
    Rule::new(
        "loose.sociabuzz_generic",
        Stage::LooseFallback,
        Platform::Sociabuzz,
        Check::Fields(|p| !has_bagibagi_marker(p) && p.is_truthy("name") && p.is_truthy("amount")),
    ),
];

/// The verified/anonymous pair only appears in bagibagi payloads. Either
/// value may be null, so presence is what counts.
fn has_bagibagi_fingerprint(payload: &Payload<'_>) -> bool {
    payload.has_any(VERIFIED_FIELDS) && payload.has_any(ANONYMOUS_FIELDS)
}

fn has_bagibagi_marker(payload: &Payload<'_>) -> bool {
    payload.has_any(VERIFIED_FIELDS)
        || payload.has_any(ANONYMOUS_FIELDS)
        || payload.has_any(KOIN_FIELDS)
}

fn discriminator(payload: &Payload<'_>) -> Option<String> {
    ["platform", "type"]
        .iter()
        .filter_map(|field| payload.get(field).and_then(Value::as_str))
        .find(|value| !value.is_empty())
        .map(str::to_lowercase)
}

/// A classified payload and the name of the rule that claimed it.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub donation: Donation,
    pub rule: &'static str,
}

/// Runs the cascade over a payload object.
pub fn classify(payload: Payload<'_>) -> Option<Classification> {
    let Some(rule) = RULES.iter().find(|rule| rule.matches(&payload)) else {
        tracing::warn!(keys = ?payload.keys(), "Could not detect donation platform");
        return None;
    };

    tracing::debug!(
        rule = rule.name,
        platform = %rule.platform,
        stage = ?rule.stage,
        "Detected donation platform"
    );

    Some(Classification {
        donation: rule.platform.parse(payload),
        rule: rule.name,
    })
}

/// Classifies an arbitrary JSON value; anything but an object is unrecognized.
pub fn classify_value(value: &Value) -> Option<Classification> {
    match value {
        Value::Object(fields) => classify(Payload::new(fields)),
        _ => None,
    }
}

/// Result of stripping a `{data: [...]}` envelope.
#[derive(Debug, PartialEq)]
pub enum Unwrapped {
    Payload(Value),
    /// The envelope carried no donations.
    Empty,
}

/// Takes the first donation out of an array envelope. Bodies that are not
/// envelopes are returned unchanged.
pub fn unwrap_envelope(body: Value) -> Unwrapped {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut fields) => match fields.remove("data") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                fields.insert("data".to_string(), other);
                return Unwrapped::Payload(Value::Object(fields));
            }
            None => return Unwrapped::Payload(Value::Object(fields)),
        },
        other => return Unwrapped::Payload(other),
    };

    match items.into_iter().next() {
        Some(first) => Unwrapped::Payload(first),
        None => Unwrapped::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detect(value: Value) -> Option<Platform> {
        classify_value(&value).map(|c| c.donation.platform)
    }

    #[test]
    fn test_rule_order() {
        let names: Vec<&str> = RULES.iter().map(|rule| rule.name).collect();
        assert_eq!(
            names,
            vec![
                "bagibagi.fingerprint",
                "explicit.sociabuzz",
                "explicit.trakteer",
                "explicit.tako",
                "explicit.saweria",
                "explicit.bagibagi",
                "fields.saweria",
                "fields.sociabuzz",
                "url.sociabuzz",
                "url.trakteer",
                "url.saweria",
                "url.tako",
                "url.bagibagi",
                "link.sociabuzz",
                "link.trakteer",
                "link.saweria",
                "link.tako",
                "link.bagibagi",
                "loose.trakteer_price",
                "loose.sociabuzz_supporter",
                "loose.saweria_donator",
                "loose.trakteer_supporter_name",
                "loose.sociabuzz_generic",
            ]
        );

        // Stages never go backwards.
        assert!(RULES.windows(2).all(|w| w[0].stage <= w[1].stage));
    }

    #[test]
    fn test_saweria_scenario() {
        let c = classify_value(&json!({
            "version": "1.0",
            "donator_name": "Alice",
            "amount_raw": 10000,
            "message": "hi"
        }))
        .unwrap();
        assert_eq!(c.rule, "fields.saweria");
        assert_eq!(c.donation.platform, Platform::Saweria);
        assert_eq!(c.donation.donor_name, "Alice");
        assert_eq!(c.donation.amount, 10000.0);
        assert_eq!(c.donation.message, "hi");
    }

    #[test]
    fn test_sociabuzz_scenario() {
        let c = classify_value(&json!({
            "supporter": "Bob",
            "email_supporter": "b@x.com",
            "currency": "IDR",
            "amount": 5000
        }))
        .unwrap();
        assert_eq!(c.rule, "fields.sociabuzz");
        assert_eq!(c.donation.platform, Platform::Sociabuzz);
        assert_eq!(c.donation.donor_name, "Bob");
        assert_eq!(c.donation.amount, 5000.0);
    }

    #[test]
    fn test_fingerprint_beats_discriminator() {
        for conflicting in ["sociabuzz", "trakteer", "tako", "saweria"] {
            let c = classify_value(&json!({
                "platform": conflicting,
                "name": "Citra",
                "amount": 1000,
                "is_verified": false,
                "isAnonymous": null
            }))
            .unwrap();
            assert_eq!(c.donation.platform, Platform::Bagibagi, "{conflicting}");
            assert_eq!(c.rule, "bagibagi.fingerprint");
        }
    }

    #[test]
    fn test_discriminator_is_case_insensitive() {
        assert_eq!(
            detect(json!({"type": "Trakteer", "supporter_name": "A", "amount": 1})),
            Some(Platform::Trakteer)
        );
        assert_eq!(
            detect(json!({"platform": "TAKO", "name": "A", "amount": 1})),
            Some(Platform::Tako)
        );
        assert_eq!(
            detect(json!({"platform": "Bagi-Bagi", "name": "A", "amount": 1})),
            Some(Platform::Bagibagi)
        );
    }

    #[test]
    fn test_discriminator_beats_field_combinations() {
        // Would be saweria by fields, but the explicit type wins.
        assert_eq!(
            detect(json!({"type": "tako", "version": "1", "donator_name": "A", "amount": 1})),
            Some(Platform::Tako)
        );
    }

    #[test]
    fn test_currency_must_be_idr() {
        // Without the email or IDR currency the sociabuzz field rule does not
        // fire; the loose supporter+amount fallback still claims it.
        let c = classify_value(&json!({"supporter": "Bob", "currency": "USD", "amount": 5}))
            .unwrap();
        assert_eq!(c.rule, "loose.sociabuzz_supporter");
    }

    #[test]
    fn test_url_and_link_hints() {
        assert_eq!(
            detect(json!({"url": "https://trakteer.id/x", "name": "A", "amount": 1})),
            Some(Platform::Trakteer)
        );
        assert_eq!(
            detect(json!({"url": "https://saweria.co/x", "name": "A", "amount": 1})),
            Some(Platform::Saweria)
        );
        let c = classify_value(&json!({
            "name": "A",
            "amount": 1,
            "content": {"link": "https://sociabuzz.com/test"}
        }))
        .unwrap();
        assert_eq!(c.rule, "link.sociabuzz");
    }

    #[test]
    fn test_loose_fallbacks_are_heuristic() {
        // These defaults are a pragmatic bias, not a schema guarantee.
        assert_eq!(
            detect(json!({"supporter_name": "A", "price": 1000})),
            Some(Platform::Trakteer)
        );
        assert_eq!(detect(json!({"donator_name": "A"})), Some(Platform::Saweria));
        assert_eq!(detect(json!({"supporter_name": "A"})), Some(Platform::Trakteer));
        assert_eq!(
            detect(json!({"name": "A", "amount": 1})),
            Some(Platform::Sociabuzz)
        );
    }

    #[test]
    fn test_loose_fallbacks_refuse_bagibagi_markers() {
        // Half a fingerprint is not enough for bagibagi, and the loose rules
        // must not claim it either.
        assert_eq!(detect(json!({"name": "A", "amount": 1, "is_verified": true})), None);
        assert_eq!(detect(json!({"name": "A", "amount": 1, "koin": 3})), None);
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(detect(json!({"foo": "bar"})), None);
        assert_eq!(detect(json!({})), None);
        assert_eq!(detect(json!("just a string")), None);
        assert_eq!(detect(json!([1, 2])), None);
    }

    #[test]
    fn test_zero_amount_still_classifies() {
        let c = classify_value(&json!({"type": "trakteer", "supporter_name": "A"})).unwrap();
        assert_eq!(c.donation.amount, 0.0);
    }

    #[test]
    fn test_unwrap_envelope() {
        let body = json!({"data": [{"name": "A"}, {"name": "B"}]});
        assert_eq!(unwrap_envelope(body), Unwrapped::Payload(json!({"name": "A"})));

        assert_eq!(unwrap_envelope(json!({"data": []})), Unwrapped::Empty);
        assert_eq!(unwrap_envelope(json!([])), Unwrapped::Empty);

        let plain = json!({"name": "A", "data": {"nested": true}});
        assert_eq!(unwrap_envelope(plain.clone()), Unwrapped::Payload(plain));
    }
}
