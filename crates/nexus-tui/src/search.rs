use std::time::{Duration, Instant};

const MIN_QUERY_LEN: usize = 2;
const QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Debouncer for the user-search box.
///
/// Edits replace the pending query and restart the quiet period, so at
/// most one request goes out per pause in typing. Every issued query
/// carries a sequence number; [`SearchDebounce::accept`] tells the
/// caller whether a finished request is still the newest one, which is
/// how out-of-order responses are kept from overwriting fresher results.
pub struct SearchDebounce {
    min_len: usize,
    delay: Duration,
    next_seq: u64,
    pending: Option<Pending>,
    latest_issued: Option<u64>,
}

struct Pending {
    seq: u64,
    query: String,
    due: Instant,
}

impl SearchDebounce {
    pub fn new() -> Self {
        Self::with_settings(MIN_QUERY_LEN, QUIET_PERIOD)
    }

    fn with_settings(min_len: usize, delay: Duration) -> Self {
        Self {
            min_len,
            delay,
            next_seq: 0,
            pending: None,
            latest_issued: None,
        }
    }

    /// Record the current contents of the search box. Returns true when
    /// the query is too short to search, meaning displayed results (and
    /// any in-flight request) should be discarded.
    pub fn input(&mut self, query: &str, now: Instant) -> bool {
        if query.chars().count() < self.min_len {
            self.pending = None;
            self.latest_issued = None;
            return true;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending = Some(Pending {
            seq,
            query: query.to_string(),
            due: now + self.delay,
        });

        false
    }

    /// Take the query whose quiet period has elapsed, if any.
    pub fn poll(&mut self, now: Instant) -> Option<(u64, String)> {
        let due = self.pending.as_ref().map_or(false, |p| now >= p.due);
        if !due {
            return None;
        }

        let pending = self.pending.take()?;
        self.latest_issued = Some(pending.seq);

        Some((pending.seq, pending.query))
    }

    /// Whether a completed request is still the newest one issued.
    pub fn accept(&self, seq: u64) -> bool {
        self.latest_issued == Some(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debounce() -> SearchDebounce {
        SearchDebounce::with_settings(2, Duration::from_millis(500))
    }

    #[test]
    fn short_queries_clear_and_issue_nothing() {
        let mut search = debounce();
        let t = Instant::now();

        assert!(search.input("a", t));
        assert_eq!(search.poll(t + Duration::from_secs(1)), None);
    }

    #[test]
    fn query_is_issued_only_after_the_quiet_period() {
        let mut search = debounce();
        let t = Instant::now();

        assert!(!search.input("al", t));
        assert_eq!(search.poll(t), None);
        assert_eq!(search.poll(t + Duration::from_millis(499)), None);
        assert_eq!(
            search.poll(t + Duration::from_millis(500)),
            Some((0, "al".to_string()))
        );

        // Issued once, not again
        assert_eq!(search.poll(t + Duration::from_secs(2)), None);
    }

    #[test]
    fn retyping_restarts_the_quiet_period() {
        let mut search = debounce();
        let t = Instant::now();

        search.input("al", t);
        search.input("ali", t + Duration::from_millis(300));

        // 500ms after the first edit, but only 200ms after the second
        assert_eq!(search.poll(t + Duration::from_millis(500)), None);

        let issued = search.poll(t + Duration::from_millis(800));
        assert_eq!(issued.map(|(_, q)| q), Some("ali".to_string()));
    }

    #[test]
    fn only_the_newest_issued_request_is_accepted() {
        let mut search = debounce();
        let t = Instant::now();

        search.input("al", t);
        let (first, _) = search.poll(t + Duration::from_millis(500)).unwrap();
        assert!(search.accept(first));

        search.input("alic", t + Duration::from_millis(600));
        let (second, _) = search.poll(t + Duration::from_millis(1200)).unwrap();

        // The stale response must be dropped, the fresh one applied
        assert!(!search.accept(first));
        assert!(search.accept(second));
    }

    #[test]
    fn clearing_the_query_drops_inflight_results() {
        let mut search = debounce();
        let t = Instant::now();

        search.input("al", t);
        let (seq, _) = search.poll(t + Duration::from_millis(500)).unwrap();
        assert!(search.accept(seq));

        // Query shrinks below the minimum while the request is in flight
        assert!(search.input("a", t + Duration::from_millis(600)));
        assert!(!search.accept(seq));
    }
}
