//! Person attribute generators: names, emails and phone numbers.

use rand::Rng;

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Barbara", "Lukas", "Sophie", "Felix", "Emma", "Jonas", "Mia",
    "Aarav", "Priya", "Rohan", "Ananya", "Vikram", "Kavya",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Martinez",
    "Wilson", "Muller", "Schmidt", "Schneider", "Fischer", "Weber", "Wagner", "Sharma", "Patel",
    "Gupta", "Iyer", "Reddy", "Nair",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

fn pick<'a, R: Rng>(rng: &mut R, values: &[&'a str]) -> &'a str {
    values[rng.gen_range(0..values.len())]
}

/// Generate a full name, "First Last".
pub fn generate_name<R: Rng>(rng: &mut R) -> String {
    format!("{} {}", pick(rng, FIRST_NAMES), pick(rng, LAST_NAMES))
}

/// Build an email address for `name`. `unique` (the entity's position in
/// its partition) and `role` keep addresses unique within a region; the
/// region id keeps them unique across regions.
pub fn generate_email<R: Rng>(
    rng: &mut R,
    name: &str,
    role: &str,
    region_id: &str,
    unique: usize,
) -> String {
    let local = name.to_lowercase().replace(' ', ".");
    format!(
        "{local}.{role}{unique}.{region_id}@{}",
        pick(rng, EMAIL_DOMAINS)
    )
}

/// Generate a phone number in the format of the region's country.
pub fn generate_phone<R: Rng>(rng: &mut R, region_id: &str) -> String {
    if region_id.starts_with("us-") {
        format!(
            "+1-{}-{}-{:04}",
            rng.gen_range(200..=999),
            rng.gen_range(200..=999),
            rng.gen_range(0..=9999)
        )
    } else if region_id.starts_with("eu-") {
        format!(
            "+49 {} {}",
            rng.gen_range(150..=179),
            rng.gen_range(1_000_000..=9_999_999)
        )
    } else {
        format!(
            "+91 {} {}",
            rng.gen_range(70_000..=99_999),
            rng.gen_range(10_000..=99_999)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_name() {
        let mut rng = StdRng::seed_from_u64(42);
        let name = generate_name(&mut rng);
        let parts: Vec<&str> = name.split(' ').collect();
        assert_eq!(parts.len(), 2);
        assert!(FIRST_NAMES.contains(&parts[0]));
        assert!(LAST_NAMES.contains(&parts[1]));
    }

    #[test]
    fn test_generate_email() {
        let mut rng = StdRng::seed_from_u64(42);
        let email = generate_email(&mut rng, "Ada Lovelace", "rider", "us-east", 7);
        assert!(email.starts_with("ada.lovelace.rider7.us-east@example."));
    }

    #[test]
    fn test_generate_phone_formats() {
        let mut rng = StdRng::seed_from_u64(42);

        let us = generate_phone(&mut rng, "us-west");
        assert!(us.starts_with("+1-"));
        assert_eq!(us.len(), "+1-555-555-5555".len());

        assert!(generate_phone(&mut rng, "eu-central").starts_with("+49 "));
        assert!(generate_phone(&mut rng, "ap-south").starts_with("+91 "));
    }
}
