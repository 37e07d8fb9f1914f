//! Inter-send delay between two dispatches in the same pass.

use std::time::Duration;

use rand::Rng;

pub const BASE_DELAY_MIN_MS: u64 = 3_000;
pub const BASE_DELAY_MAX_MS: u64 = 8_000;
pub const PER_WORD_MS: u64 = 40;
pub const MAX_DELAY_MS: u64 = 12_000;

/// Random 3..=8 s base plus a per-word term, capped at 12 s.
pub fn send_delay(reply_text: &str) -> Duration {
    send_delay_with(&mut rand::thread_rng(), reply_text)
}

pub fn send_delay_with<R: Rng + ?Sized>(rng: &mut R, reply_text: &str) -> Duration {
    let base = rng.gen_range(BASE_DELAY_MIN_MS..=BASE_DELAY_MAX_MS);
    let words = reply_text.split_whitespace().count() as u64;
    let total = base.saturating_add(words.saturating_mul(PER_WORD_MS));
    Duration::from_millis(total.min(MAX_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{send_delay_with, MAX_DELAY_MS};

    #[test]
    fn delay_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let delay = send_delay_with(&mut rng, "Спасибо за отзыв, рады что понравилось");
            assert!(delay >= Duration::from_millis(3_000));
            assert!(delay <= Duration::from_millis(MAX_DELAY_MS));
        }
    }

    #[test]
    fn long_replies_hit_the_cap() {
        let mut rng = StdRng::seed_from_u64(1);
        let long_reply = "слово ".repeat(500);
        assert_eq!(send_delay_with(&mut rng, &long_reply), Duration::from_millis(MAX_DELAY_MS));
    }
}
