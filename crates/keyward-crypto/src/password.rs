//! Deterministic password derivation.
//!
//! `digest = PBKDF2-HMAC-SHA512(domain ‖ username ‖ secret, salt, iterations)`
//! is read as one big-endian integer and spent position by position: each
//! template symbol picks a subset, emits `subset[n % len]` and divides `n`
//! by `len`. Once `n` reaches zero nothing further is emitted, so the result
//! can be shorter than the template.

use keyward_core::{DomainEntry, Template};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use zeroize::Zeroize;

use crate::kdf::pbkdf2_sha512;
use crate::master::MasterSecret;

pub const DEFAULT_PEPPER: &[u8] = b"pepper";
pub const DEFAULT_ITERATIONS: u32 = 4096;

/// Inputs that select one password.
#[derive(Clone, Copy)]
pub struct DerivationInput<'a> {
    pub domain: &'a str,
    pub username: &'a str,
    pub secret: &'a [u8],
    pub salt: &'a [u8],
    pub iterations: i64,
    pub template: &'a Template,
    pub extra: &'a str,
}

/// Iteration counts of zero or below fall back to [`DEFAULT_ITERATIONS`].
pub fn effective_iterations(iterations: i64) -> u32 {
    if iterations <= 0 {
        tracing::warn!(iterations, "iteration count below 1, using {DEFAULT_ITERATIONS}");
        return DEFAULT_ITERATIONS;
    }
    u32::try_from(iterations).unwrap_or(u32::MAX)
}

pub fn generate(input: &DerivationInput<'_>) -> String {
    let mut message =
        Vec::with_capacity(input.domain.len() + input.username.len() + input.secret.len());
    message.extend_from_slice(input.domain.as_bytes());
    message.extend_from_slice(input.username.as_bytes());
    message.extend_from_slice(input.secret);

    let mut digest = pbkdf2_sha512(&message, input.salt, effective_iterations(input.iterations));
    message.zeroize();
    let mut n = BigUint::from_bytes_be(&digest);
    digest.zeroize();

    let mut password = String::with_capacity(input.template.len());
    for &class in input.template.classes() {
        if n.is_zero() {
            break;
        }
        let subset = input.template.alphabet(class, input.extra);
        if subset.is_empty() {
            continue;
        }
        let len = BigUint::from(subset.len());
        let index = (&n % &len).to_usize().unwrap_or(0);
        password.push(subset[index]);
        n /= &len;
    }
    password
}

/// Password for `entry`. The entry's own salt is used when it has one,
/// otherwise `pepper`.
pub fn generate_for_entry(entry: &DomainEntry, secret: &MasterSecret, pepper: &[u8]) -> String {
    let settings = entry.settings();
    let salt = if settings.salt.is_empty() {
        pepper
    } else {
        &settings.salt
    };
    generate(&DerivationInput {
        domain: entry.domain(),
        username: entry.username(),
        secret: secret.as_bytes(),
        salt,
        iterations: settings.iterations,
        template: entry.template(),
        extra: entry.extra_characters(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::template::DEFAULT_EXTRA;

    fn derive(template: &str, iterations: i64) -> String {
        let template: Template = template.parse().unwrap();
        generate(&DerivationInput {
            domain: "some.domain",
            username: "",
            secret: b"foo",
            salt: DEFAULT_PEPPER,
            iterations,
            template: &template,
            extra: DEFAULT_EXTRA,
        })
    }

    #[test]
    fn test_all_x_template_uses_default_set() {
        assert_eq!(derive("xxxxxxxxxx", 4096), "]#]Y6Q-+)T");
    }

    #[test]
    fn test_mixed_template() {
        assert_eq!(derive("xaxnxxAoxx", 4096), "]ew26XW.X<");
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(derive("aAnoxxxx", 100), derive("aAnoxxxx", 100));
    }

    #[test]
    fn test_non_positive_iterations_fall_back() {
        assert_eq!(derive("xxxxxxxxxx", 0), "]#]Y6Q-+)T");
        assert_eq!(derive("xxxxxxxxxx", -5), "]#]Y6Q-+)T");
    }

    #[test]
    fn test_long_template_exhausts_digest() {
        // 512 bits last roughly 80 draws from the 86-character default set.
        let password = derive(&"x".repeat(200), 16);
        let len = password.chars().count();
        assert!(len < 200, "digest must run out, got {len} characters");
        assert!(len > 60);
    }

    #[test]
    fn test_empty_extra_subset_emits_nothing() {
        let template: Template = "aoa".parse().unwrap();
        let password = generate(&DerivationInput {
            domain: "d",
            username: "u",
            secret: b"s",
            salt: DEFAULT_PEPPER,
            iterations: 8,
            template: &template,
            extra: "",
        });
        assert_eq!(password.chars().count(), 2);
        assert!(password.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_classes_respected() {
        let password = derive("aAno", 32);
        let chars: Vec<char> = password.chars().collect();
        assert!(chars[0].is_ascii_lowercase());
        assert!(chars[1].is_ascii_uppercase());
        assert!(chars[2].is_ascii_digit());
        assert!(DEFAULT_EXTRA.contains(chars[3]));
    }

    #[test]
    fn test_username_changes_password() {
        let template: Template = "xxxxxxxxxx".parse().unwrap();
        let base = DerivationInput {
            domain: "some.domain",
            username: "",
            secret: b"foo",
            salt: DEFAULT_PEPPER,
            iterations: 16,
            template: &template,
            extra: DEFAULT_EXTRA,
        };
        let with_user = DerivationInput {
            username: "alice",
            ..base
        };
        assert_ne!(generate(&base), generate(&with_user));
    }
}
