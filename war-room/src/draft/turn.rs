// Turn resolution: pure queries over a ledger snapshot.

use super::ledger::{Ledger, Pick};

/// The first pick (ascending sequence number) with no bound item, or `None`
/// once the draft is complete.
pub fn current_pick(ledger: &Ledger) -> Option<&Pick> {
    ledger.picks().iter().find(|p| !p.is_bound())
}

/// The next `n` picks strictly after the current one, in order.
pub fn upcoming(ledger: &Ledger, n: usize) -> Vec<&Pick> {
    let Some(current) = current_pick(ledger) else {
        return Vec::new();
    };
    ledger
        .picks()
        .iter()
        .filter(|p| p.pick_number > current.pick_number)
        .take(n)
        .collect()
}

/// Whether `owner` holds the current pick.
pub fn is_on_the_clock(ledger: &Ledger, owner: &str) -> bool {
    current_pick(ledger).is_some_and(|p| p.owner == owner)
}

/// Number of picks before `owner` is up: `Some(0)` when they are on the
/// clock, `None` when they have no remaining open picks.
pub fn picks_until_turn(ledger: &Ledger, owner: &str) -> Option<usize> {
    let current = current_pick(ledger)?;
    ledger
        .picks()
        .iter()
        .filter(|p| p.pick_number >= current.pick_number && !p.is_bound())
        .position(|p| p.owner == owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::ledger::tests::{bound_pick, open_pick};

    fn ledger(picks: Vec<Pick>) -> Ledger {
        Ledger::from_picks(picks).unwrap()
    }

    #[test]
    fn current_is_first_unbound() {
        let l = ledger(vec![bound_pick(1, "A", 1), open_pick(2, "B"), open_pick(3, "A")]);
        assert_eq!(current_pick(&l).unwrap().pick_number, 2);
    }

    #[test]
    fn current_is_minimal_even_with_gaps() {
        // Out-of-order binding leaves an earlier hole; the hole is current.
        let l = ledger(vec![open_pick(1, "A"), bound_pick(2, "B", 5), open_pick(3, "A")]);
        assert_eq!(current_pick(&l).unwrap().pick_number, 1);
        let next: Vec<u32> = upcoming(&l, 5).iter().map(|p| p.pick_number).collect();
        assert_eq!(next, vec![2, 3]);
    }

    #[test]
    fn complete_draft_has_no_current() {
        let l = ledger(vec![bound_pick(1, "A", 1), bound_pick(2, "B", 2)]);
        assert!(current_pick(&l).is_none());
        assert!(upcoming(&l, 3).is_empty());
        assert_eq!(picks_until_turn(&l, "A"), None);
    }

    #[test]
    fn upcoming_excludes_current_and_truncates() {
        let l = ledger((1..=6).map(|n| open_pick(n, if n % 2 == 1 { "A" } else { "B" })).collect());
        let next: Vec<u32> = upcoming(&l, 3).iter().map(|p| p.pick_number).collect();
        assert_eq!(next, vec![2, 3, 4]);
    }

    #[test]
    fn picks_until_turn_counts_open_picks() {
        let l = ledger(vec![
            bound_pick(1, "A", 1),
            open_pick(2, "B"),
            open_pick(3, "C"),
            open_pick(4, "A"),
        ]);
        assert_eq!(picks_until_turn(&l, "B"), Some(0));
        assert_eq!(picks_until_turn(&l, "A"), Some(2));
        assert_eq!(picks_until_turn(&l, "Z"), None);
        assert!(is_on_the_clock(&l, "B"));
        assert!(!is_on_the_clock(&l, "A"));
    }
}
