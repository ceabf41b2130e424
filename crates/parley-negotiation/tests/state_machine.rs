//! Property tests for the session state machine

use chrono::{Duration, Utc};
use parley_negotiation::{NegotiationSession, Transition};
use parley_types::{AgentId, Amount, OfferDraft, Resolution, SessionId, SessionState, Terms};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Action {
    Offer { by_opener: bool, price: u8 },
    Withdraw { by_opener: bool },
    Cancel { by_opener: bool },
    Expire,
    Outsider { price: u8 },
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        8 => (any::<bool>(), 0u8..6).prop_map(|(by_opener, price)| Action::Offer { by_opener, price }),
        1 => any::<bool>().prop_map(|by_opener| Action::Withdraw { by_opener }),
        1 => any::<bool>().prop_map(|by_opener| Action::Cancel { by_opener }),
        1 => Just(Action::Expire),
        1 => (0u8..6).prop_map(|price| Action::Outsider { price }),
    ]
}

fn offer(price: u8) -> OfferDraft {
    OfferDraft::propose(Terms::new().with("price", i64::from(price)), Amount::new(u64::from(price)))
}

proptest! {
    #[test]
    fn terminal_states_are_final(max_rounds in 2u32..12, actions in prop::collection::vec(action(), 0..40)) {
        let (a, b) = (AgentId::new(), AgentId::new());
        let now = Utc::now();
        let mut session = NegotiationSession::open(
            SessionId::new(), a, b, offer(3), max_rounds, now, now + Duration::hours(1),
        ).unwrap();

        let mut terminal: Option<(SessionState, Resolution, usize)> = None;

        for action in actions {
            let before = session.clone();
            let result = match action {
                Action::Offer { by_opener, price } => session
                    .submit(if by_opener { a } else { b }, offer(price), now)
                    .map(|t| matches!(t, Transition::Resolved(_))),
                Action::Withdraw { by_opener } => session
                    .submit(if by_opener { a } else { b }, OfferDraft::withdraw(), now)
                    .map(|_| true),
                Action::Cancel { by_opener } => session.cancel(if by_opener { a } else { b }, now).map(|_| true),
                Action::Expire => session.expire(now).map(|_| true),
                Action::Outsider { price } => session.submit(AgentId::new(), offer(price), now).map(|_| false),
            };

            match result {
                // Failed calls never mutate
                Err(_) => prop_assert_eq!(&session, &before),
                Ok(resolved) => {
                    prop_assert!(before.is_open());
                    prop_assert_eq!(resolved, session.state.is_terminal());
                }
            }

            if let Some((state, resolution, rounds)) = &terminal {
                prop_assert_eq!(session.state, *state);
                prop_assert_eq!(session.resolution.as_ref(), Some(resolution));
                prop_assert_eq!(session.rounds.len(), *rounds);
            } else if session.state.is_terminal() {
                let resolution = session.resolution.clone().unwrap();
                prop_assert_eq!(resolution.state(), session.state);
                terminal = Some((session.state, resolution, session.rounds.len()));
            }

            prop_assert!(session.rounds.len() <= max_rounds as usize);
            for (i, round) in session.rounds.iter().enumerate() {
                prop_assert_eq!(round.round_index as usize, i);
            }
        }
    }

    #[test]
    fn acceptance_always_matches_previous_counterpart_offer(prices in prop::collection::vec(0u8..4, 1..10)) {
        let (a, b) = (AgentId::new(), AgentId::new());
        let now = Utc::now();
        let mut session = NegotiationSession::open(
            SessionId::new(), a, b, offer(9), 50, now, now + Duration::hours(1),
        ).unwrap();

        for (i, price) in prices.into_iter().enumerate() {
            let agent = if i % 2 == 0 { b } else { a };
            if session.submit(agent, offer(price), now).is_err() {
                break;
            }
        }

        if let Some(Resolution::Accepted { terms, value, proposer, acceptor }) = &session.resolution {
            let n = session.rounds.len();
            let (matched, matching) = (&session.rounds[n - 2], &session.rounds[n - 1]);
            prop_assert_eq!(&matched.terms, terms);
            prop_assert_eq!(&matching.terms, terms);
            prop_assert_eq!(matched.value_proposed, *value);
            prop_assert_eq!(matched.submitter_id, *proposer);
            prop_assert_eq!(matching.submitter_id, *acceptor);
            prop_assert_ne!(proposer, acceptor);
        }
    }
}
