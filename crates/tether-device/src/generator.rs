//! Record generation for one device connection.

use rand::Rng;
use tether_core::Record;

const DIGITS: &[u8; 10] = b"0123456789";

/// Produces the record stream for one session.
#[derive(Debug)]
pub struct RecordGenerator {
    request_id: String,
    counter: u64,
    min_len: usize,
    max_len: usize,
}

impl RecordGenerator {
    /// Create a generator echoing `request_id`, with payload lengths drawn
    /// from `min_len..=max_len`.
    pub fn new(request_id: impl Into<String>, min_len: usize, max_len: usize) -> Self {
        Self {
            request_id: request_id.into(),
            counter: 0,
            min_len,
            max_len: max_len.max(min_len),
        }
    }

    /// Counter of the last record produced (0 before the first).
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Produce the next sealed record.
    pub fn next_record<R: Rng>(&mut self, rng: &mut R) -> Record {
        self.counter += 1;
        let len = rng.random_range(self.min_len..=self.max_len);
        Record::sealed(self.request_id.clone(), self.counter, payload(len))
    }

    /// Produce the next record as a terminated wire line.
    pub fn next_line<R: Rng>(&mut self, rng: &mut R) -> serde_json::Result<Vec<u8>> {
        self.next_record(rng).to_line()
    }
}

/// `len` ASCII digits cycling `0..=9`.
pub fn payload(len: usize) -> String {
    DIGITS.iter().cycle().take(len).map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn payload_cycles_digits() {
        assert_eq!(payload(0), "");
        assert_eq!(payload(3), "012");
        assert_eq!(payload(12), "012345678901");
    }

    #[test]
    fn counter_starts_at_one_and_increments() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut generator = RecordGenerator::new("abc", 5, 10);
        assert_eq!(generator.counter(), 0);
        for expected in 1..=5 {
            let record = generator.next_record(&mut rng);
            assert_eq!(record.counter, expected);
            assert_eq!(record.request_id, "abc");
        }
        assert_eq!(generator.counter(), 5);
    }

    #[test]
    fn payload_length_within_inclusive_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut generator = RecordGenerator::new("id", 3, 6);
        let mut seen_max = false;
        for _ in 0..500 {
            let len = generator.next_record(&mut rng).payload.len();
            assert!((3..=6).contains(&len));
            seen_max |= len == 6;
        }
        assert!(seen_max, "upper bound should be reachable");
    }

    #[test]
    fn equal_bounds_give_fixed_length() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut generator = RecordGenerator::new("id", 750, 750);
        assert_eq!(generator.next_record(&mut rng).payload.len(), 750);
    }

    #[test]
    fn records_are_sealed() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut generator = RecordGenerator::new("id", 0, 20);
        for _ in 0..20 {
            assert!(generator.next_record(&mut rng).verify());
        }
    }

    #[test]
    fn line_is_terminated_json() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut generator = RecordGenerator::new("id", 4, 4);
        let line = generator.next_line(&mut rng).unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        let record: Record = serde_json::from_slice(&line[..line.len() - 1]).unwrap();
        assert_eq!(record.payload, "0123");
        assert_eq!(record.counter, 1);
    }
}
