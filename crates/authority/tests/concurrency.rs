use std::sync::{Arc, Barrier};
use std::thread;

use authority::{Authority, AuthorityConfig, Error, Intent, IssueRequest};
use policy::{ActionType, Policy, Subject};
use storage::CapabilityState;

const ATTEMPTS: usize = 64;

fn authority() -> Arc<Authority> {
    Arc::new(Authority::new(Policy::default(), AuthorityConfig::default().without_rate_limit()).unwrap())
}

#[test]
fn concurrent_consumers_see_a_single_winner() {
    let authority = authority();
    let operator = Subject::operator("operator-1");
    let payload = Intent::new("C-105", "+79001234567");
    let token = authority
        .issue(&operator, &IssueRequest::callback(payload.clone(), "mf-a"))
        .unwrap();
    let barrier = Arc::new(Barrier::new(ATTEMPTS));

    let handles: Vec<_> = (0..ATTEMPTS)
        .map(|_| {
            let authority = Arc::clone(&authority);
            let barrier = Arc::clone(&barrier);
            let (operator, payload, id) = (operator.clone(), payload.clone(), token.capability_id.clone());
            thread::spawn(move || {
                barrier.wait();
                authority.consume(&operator, &id, &ActionType::callback(), &payload)
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .all(|e| *e == Error::CapabilityReplay)
    );
    assert_eq!(
        authority.capability(&token.capability_id).unwrap().state(),
        CapabilityState::Consumed
    );
}

#[test]
fn mismatched_racers_cannot_steal_the_win() {
    let authority = authority();
    let operator = Subject::operator("operator-1");
    let payload = Intent::new("C-105", "+79001234567");
    let token = authority
        .issue(&operator, &IssueRequest::callback(payload.clone(), "mf-a"))
        .unwrap();
    let barrier = Arc::new(Barrier::new(ATTEMPTS));

    // Odd attempts try a different phone; only even ones may ever win.
    let handles: Vec<_> = (0..ATTEMPTS)
        .map(|i| {
            let authority = Arc::clone(&authority);
            let barrier = Arc::clone(&barrier);
            let operator = operator.clone();
            let id = token.capability_id.clone();
            let attempt = if i % 2 == 0 {
                payload.clone()
            } else {
                Intent::new("C-105", format!("+7900000{i:04}"))
            };
            thread::spawn(move || {
                barrier.wait();
                (i, authority.consume(&operator, &id, &ActionType::callback(), &attempt))
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<_> = outcomes.iter().filter(|(_, o)| o.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].0 % 2, 0);
    for (i, outcome) in &outcomes {
        if i % 2 == 1 {
            let err = outcome.as_ref().unwrap_err();
            assert!(
                matches!(err, Error::PayloadMismatch | Error::CapabilityReplay),
                "attempt {i}: {err:?}"
            );
        }
    }
}

#[test]
fn unrelated_capabilities_are_consumed_independently() {
    let authority = authority();
    let tokens: Vec<_> = (0..ATTEMPTS)
        .map(|i| {
            let subject = Subject::operator(format!("operator-{i}"));
            let payload = Intent::new(format!("C-1{:02}", i % 100), "+79001234567");
            let token = authority
                .issue(&subject, &IssueRequest::callback(payload.clone(), "mf-a"))
                .unwrap();
            (subject, payload, token.capability_id)
        })
        .collect();

    let handles: Vec<_> = tokens
        .into_iter()
        .map(|(subject, payload, id)| {
            let authority = Arc::clone(&authority);
            thread::spawn(move || authority.consume(&subject, &id, &ActionType::callback(), &payload))
        })
        .collect();

    assert!(handles.into_iter().all(|h| h.join().unwrap().is_ok()));
}
