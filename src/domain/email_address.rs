use validator::ValidateEmail;

/// A validated RFC-mailbox string. Not wired into submission validation:
/// `from_address` is a free-text sender tag (spec §4.4) and only required to
/// be non-empty, so `Submitter::validate` checks that directly rather than
/// through this parser. Kept as a domain type for callers that do want a
/// checked mailbox (e.g. a future outbound-relay integration), and recipient
/// lists (`to`/`cc`/`bcc`) are likewise stored and displayed verbatim (spec
/// §3) without running through this parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: String) -> Result<Self, String> {
        if raw.trim().is_empty() {
            return Err("address must not be empty".to_string());
        }
        ValidateEmail::validate_email(&raw)
            .then_some(Self(raw.clone()))
            .ok_or_else(|| format!("invalid email address: {raw:?}"))
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str { &self.0 }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self { value.0 }
}

#[cfg(test)]
mod tests {
    use claims::assert_err;
    use claims::assert_ok;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;
    use quickcheck::Arbitrary;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[derive(Clone, Debug)]
    struct TestEmail(pub String);

    impl Arbitrary for TestEmail {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let mut rng = StdRng::seed_from_u64(u64::arbitrary(g));
            Self(SafeEmail().fake_with_rng(&mut rng))
        }
    }

    #[quickcheck_macros::quickcheck]
    fn fake_addresses_parse(email: TestEmail) -> bool { EmailAddress::parse(email.0).is_ok() }

    #[test]
    fn empty_is_rejected() {
        assert_err!(EmailAddress::parse("".to_string()));
    }

    #[test]
    fn missing_at_is_rejected() {
        assert_err!(EmailAddress::parse("nodomain".to_string()));
    }

    #[test]
    fn ordinary_address_is_accepted() {
        assert_ok!(EmailAddress::parse("a@x.example".to_string()));
    }
}
