//! Operational transform for single-character edits
//!
//! An incoming operation is shifted past every confirmed edit its submitter
//! had not observed, in commit order:
//! - a prior insert at or before the target moves the target right by one
//!   (so concurrent inserts at the same position land after the earlier one)
//! - a prior erase strictly before the target moves it left by one
//!
//! Repositions are returned unchanged. An edit whose position cannot be
//! shifted without overflowing is rejected.

use crate::config::TransformWindow;
use crate::id::UserId;
use crate::operation::{ConfirmedOp, Operation};

/// Adjust `op` against `unseen`, the edits committed since the submitter's
/// view of the document, in commit order.
///
/// Returns `None` if the shifted position does not fit in a `usize`; such a
/// position lies past the end of any buffer.
pub fn transform<'a, I>(op: Operation, unseen: I) -> Option<Operation>
where
    I: IntoIterator<Item = &'a Operation>,
{
    if !op.is_edit() {
        return Some(op);
    }

    let mut position = op.position();
    for prior in unseen {
        match *prior {
            Operation::Insert { position: p, .. } if p <= position => {
                position = position.checked_add(1)?;
            }
            Operation::Erase { position: p } if p < position => position -= 1,
            _ => {}
        }
    }
    Some(op.with_position(position))
}

/// Select the confirmed edits an operation from `submitter` must be
/// transformed against. `since` is the submitter's last synced clock.
pub fn reference_window<'a>(
    log: &'a [ConfirmedOp],
    since: u64,
    submitter: &'a UserId,
    window: TransformWindow,
) -> impl Iterator<Item = &'a Operation> + 'a {
    let start = match window {
        TransformWindow::SinceLastSync => {
            usize::try_from(since).map_or(log.len(), |s| s.min(log.len()))
        }
        TransformWindow::FullHistory => 0,
    };

    log[start..]
        .iter()
        .filter(move |entry| match window {
            TransformWindow::SinceLastSync => &entry.user != submitter,
            TransformWindow::FullHistory => true,
        })
        .map(|entry| &entry.op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(op: Operation, timestamp: u64, user: &str) -> ConfirmedOp {
        ConfirmedOp {
            op,
            timestamp,
            user: UserId::new(user).unwrap(),
        }
    }

    #[test]
    fn test_prior_insert_before_shifts_right() {
        let prior = [Operation::insert(2, 'a')];
        assert_eq!(transform(Operation::erase(4), &prior), Some(Operation::erase(5)));
    }

    #[test]
    fn test_tie_places_new_insert_after() {
        let prior = [Operation::insert(3, 'a')];
        assert_eq!(
            transform(Operation::insert(3, 'b'), &prior),
            Some(Operation::insert(4, 'b'))
        );
    }

    #[test]
    fn test_prior_erase_before_shifts_left() {
        let prior = [Operation::erase(1)];
        assert_eq!(transform(Operation::insert(4, 'x'), &prior), Some(Operation::insert(3, 'x')));

        // an erase at the same position does not move the target
        let prior = [Operation::erase(4)];
        assert_eq!(transform(Operation::insert(4, 'x'), &prior), Some(Operation::insert(4, 'x')));
    }

    #[test]
    fn test_edits_after_target_are_ignored() {
        let prior = [Operation::insert(5, '!')];
        assert_eq!(transform(Operation::erase(0), &prior), Some(Operation::erase(0)));
    }

    #[test]
    fn test_reposition_passes_through() {
        let prior = [Operation::insert(0, 'a'), Operation::insert(0, 'b')];
        assert_eq!(
            transform(Operation::reposition(1), &prior),
            Some(Operation::reposition(1))
        );
    }

    #[test]
    fn test_shifts_accumulate_in_commit_order() {
        // insert at 0 moves target 2 -> 3, then erase at 2 moves it back to 2
        let prior = [Operation::insert(0, 'a'), Operation::erase(2)];
        assert_eq!(transform(Operation::insert(2, 'z'), &prior), Some(Operation::insert(2, 'z')));
    }

    #[test]
    fn test_overflowing_shift_is_rejected() {
        let prior = [Operation::insert(0, 'a')];
        assert_eq!(transform(Operation::insert(usize::MAX, 'x'), &prior), None);
        assert_eq!(transform(Operation::erase(usize::MAX), &prior), None);

        // nothing to shift past, so the position is left for the buffer to reject
        assert_eq!(
            transform(Operation::insert(usize::MAX, 'x'), std::iter::empty()),
            Some(Operation::insert(usize::MAX, 'x'))
        );
    }

    #[test]
    fn test_window_skips_own_edits() {
        let alice = UserId::new("alice").unwrap();
        let log = vec![
            confirmed(Operation::insert(0, 'x'), 0, "bob"),
            confirmed(Operation::insert(0, 'a'), 1, "alice"),
            confirmed(Operation::insert(0, 'b'), 2, "bob"),
        ];

        let since_sync: Vec<_> =
            reference_window(&log, 1, &alice, TransformWindow::SinceLastSync).collect();
        assert_eq!(since_sync, vec![&Operation::insert(0, 'b')]);

        let full: Vec<_> =
            reference_window(&log, 1, &alice, TransformWindow::FullHistory).collect();
        assert_eq!(full.len(), 3);
    }
}
