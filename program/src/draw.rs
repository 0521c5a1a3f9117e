//! The draw state machine.
//!
//! Every operation takes the lottery by reference and is the only writer
//! for the duration of the call. Requesting randomness and receiving it are
//! two separate operations tied together by `Lottery::pending_request_id`.

use solana_program::{clock::UnixTimestamp, msg, pubkey::Pubkey};

use crate::{
    error::LotteryError,
    events::LotteryEvent,
    state::{Lottery, LotteryState, UpkeepStatus},
    utils,
    vrf::{RandomWordsRequest, RandomnessCoordinator},
};

/// Pays the pot out to the winner. The only fallible side effect of a
/// settlement.
pub trait PrizeTransfer {
    fn transfer_prize(&mut self, winner: &Pubkey, amount: u64) -> Result<(), LotteryError>;
}

/// Record a paid entry for `player`.
pub fn enter(lottery: &mut Lottery, player: Pubkey, amount: u64) -> Result<LotteryEvent, LotteryError> {
    if amount < lottery.config.entrance_fee {
        return Err(LotteryError::NotEnoughFunds);
    }
    if lottery.state != LotteryState::Open {
        return Err(LotteryError::RoundNotOpen);
    }
    if lottery.entrants.len() >= lottery.capacity {
        return Err(LotteryError::LotteryFull);
    }

    lottery.pot = lottery
        .pot
        .checked_add(amount)
        .ok_or(LotteryError::AmountOverflow)?;
    lottery.entrants.push(player);

    Ok(LotteryEvent::LotteryEnter { player, amount })
}

/// Evaluate whether a draw is due. Never mutates.
pub fn check_upkeep(lottery: &Lottery, now: UnixTimestamp) -> UpkeepStatus {
    let is_open = lottery.state == LotteryState::Open;
    let time_passed = u64::try_from(elapsed(lottery, now))
        .map_or(false, |elapsed| elapsed > lottery.config.interval);
    let has_balance = lottery.pot > 0;
    let has_entrants = !lottery.entrants.is_empty();

    UpkeepStatus {
        upkeep_needed: is_open && time_passed && has_balance && has_entrants,
        is_open,
        time_passed,
        has_balance,
        has_entrants,
    }
}

/// Close the round and ask the oracle for randomness.
///
/// The predicate is re-evaluated here so a caller acting on a stale
/// `check_upkeep` answer cannot start a draw.
pub fn perform_upkeep<C: RandomnessCoordinator>(
    lottery: &mut Lottery,
    now: UnixTimestamp,
    coordinator: &mut C,
) -> Result<LotteryEvent, LotteryError> {
    let status = check_upkeep(lottery, now);
    if !status.upkeep_needed {
        msg!("Upkeep status: {:?}", status);
        return Err(LotteryError::UpkeepNotNeeded {
            state: lottery.state,
            balance: lottery.pot,
            entrants: lottery.entrants.len() as u32,
            elapsed: elapsed(lottery, now),
        });
    }

    let request = RandomWordsRequest {
        key_hash: lottery.config.key_hash,
        subscription_id: lottery.config.subscription_id,
        request_confirmations: lottery.config.request_confirmations,
        callback_gas_limit: lottery.config.callback_gas_limit,
        num_words: lottery.config.num_words,
    };
    let request_id = coordinator.request_random_words(&request)?;

    lottery.state = LotteryState::Calculating;
    lottery.pending_request_id = Some(request_id);

    Ok(LotteryEvent::RequestedLotteryWinner { request_id })
}

/// Oracle callback: settle the round with the delivered randomness.
///
/// The new round state is staged on a copy and committed only once the
/// payout went through, so a failed transfer leaves the lottery exactly as
/// it was (still calculating, same entrants, same request outstanding).
pub fn fulfill_random_words<P: PrizeTransfer>(
    lottery: &mut Lottery,
    request_id: u64,
    random_words: &[[u8; 32]],
    now: UnixTimestamp,
    payout: &mut P,
) -> Result<LotteryEvent, LotteryError> {
    if lottery.pending_request_id != Some(request_id) {
        msg!(
            "Request {} does not match outstanding request {:?}",
            request_id,
            lottery.pending_request_id
        );
        return Err(LotteryError::UnrecognizedRequest);
    }
    let random_word = random_words.first().ok_or(LotteryError::NoRandomWords)?;

    let index = utils::winner_index(random_word, lottery.entrants.len());
    let winner = *lottery.entrant(index)?;
    msg!("Winner index {} of {} entrants", index, lottery.entrants.len());

    let mut settled = lottery.clone();
    settled.recent_winner = winner;
    settled.entrants.clear();
    settled.state = LotteryState::Open;
    settled.last_timestamp = now;
    settled.pending_request_id = None;
    let prize = settled.pot;
    settled.pot = 0;

    payout.transfer_prize(&winner, prize)?;
    *lottery = settled;

    Ok(LotteryEvent::WinnerPicked {
        winner,
        amount: prize,
    })
}

fn elapsed(lottery: &Lottery, now: UnixTimestamp) -> i64 {
    now.saturating_sub(lottery.last_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LotteryConfig;
    use std::collections::HashMap;

    const FEE: u64 = 100;
    const INTERVAL: u64 = 30;
    const START: UnixTimestamp = 1_000;

    #[derive(Default)]
    struct FakeCoordinator {
        last_id: u64,
        requests: Vec<RandomWordsRequest>,
    }

    impl RandomnessCoordinator for FakeCoordinator {
        fn request_random_words(&mut self, request: &RandomWordsRequest) -> Result<u64, LotteryError> {
            self.last_id += 1;
            self.requests.push(request.clone());
            Ok(self.last_id)
        }
    }

    struct FailingCoordinator;

    impl RandomnessCoordinator for FailingCoordinator {
        fn request_random_words(&mut self, _: &RandomWordsRequest) -> Result<u64, LotteryError> {
            Err(LotteryError::InvalidCoordinatorResponse)
        }
    }

    #[derive(Default)]
    struct FakeBank {
        balances: HashMap<Pubkey, u64>,
        reject: bool,
    }

    impl PrizeTransfer for FakeBank {
        fn transfer_prize(&mut self, winner: &Pubkey, amount: u64) -> Result<(), LotteryError> {
            if self.reject {
                return Err(LotteryError::PrizeTransferFailed);
            }
            *self.balances.entry(*winner).or_default() += amount;
            Ok(())
        }
    }

    fn new_lottery() -> Lottery {
        let config = LotteryConfig {
            entrance_fee: FEE,
            interval: INTERVAL,
            key_hash: [3u8; 32],
            subscription_id: 588,
            ..LotteryConfig::default()
        };
        Lottery::new(Pubkey::new_unique(), config, START, 16)
    }

    fn players(n: usize) -> Vec<Pubkey> {
        (0..n).map(|_| Pubkey::new_unique()).collect()
    }

    fn word(value: u64) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        word
    }

    fn due() -> UnixTimestamp {
        START + INTERVAL as i64 + 1
    }

    /// Lottery with one paid entrant whose interval has elapsed, already
    /// moved to calculating.
    fn calculating_lottery(coordinator: &mut FakeCoordinator) -> (Lottery, Pubkey) {
        let mut lottery = new_lottery();
        let player = Pubkey::new_unique();
        enter(&mut lottery, player, FEE).unwrap();
        perform_upkeep(&mut lottery, due(), coordinator).unwrap();
        (lottery, player)
    }

    #[test]
    fn starts_open_with_configured_values() {
        let lottery = new_lottery();
        assert_eq!(lottery.lottery_state(), LotteryState::Open);
        assert_eq!(lottery.entrance_fee(), FEE);
        assert_eq!(lottery.interval(), INTERVAL);
        assert_eq!(lottery.callback_gas_limit(), 500_000);
        assert_eq!(lottery.request_confirmations(), 3);
        assert_eq!(lottery.num_words(), 1);
        assert_eq!(lottery.last_timestamp(), START);
        assert_eq!(lottery.recent_winner(), &Pubkey::default());
        assert_eq!(lottery.entrant_count(), 0);
    }

    #[test]
    fn underpaid_entry_is_rejected() {
        let mut lottery = new_lottery();
        for paid in [0, 1, FEE - 1] {
            assert_eq!(
                enter(&mut lottery, Pubkey::new_unique(), paid),
                Err(LotteryError::NotEnoughFunds)
            );
        }
        assert_eq!(lottery.entrant_count(), 0);
        assert_eq!(lottery.pot(), 0);
    }

    #[test]
    fn entries_are_recorded_in_call_order() {
        let mut lottery = new_lottery();
        let players = players(3);
        for player in &players {
            let event = enter(&mut lottery, *player, FEE).unwrap();
            assert_eq!(
                event,
                LotteryEvent::LotteryEnter {
                    player: *player,
                    amount: FEE
                }
            );
        }
        // repeat entries are allowed and overpayment goes into the pot
        enter(&mut lottery, players[0], FEE * 2).unwrap();

        assert_eq!(lottery.entrant_count(), 4);
        for (i, player) in players.iter().enumerate() {
            assert_eq!(lottery.entrant(i).unwrap(), player);
        }
        assert_eq!(lottery.entrant(3).unwrap(), &players[0]);
        assert_eq!(lottery.entrant(4), Err(LotteryError::EntrantIndexOutOfRange));
        assert_eq!(lottery.pot(), FEE * 5);
    }

    #[test]
    fn full_lottery_rejects_entries() {
        let mut lottery = new_lottery();
        lottery.capacity = 1;
        enter(&mut lottery, Pubkey::new_unique(), FEE).unwrap();
        assert_eq!(
            enter(&mut lottery, Pubkey::new_unique(), FEE),
            Err(LotteryError::LotteryFull)
        );
        assert_eq!(lottery.pot(), FEE);
    }

    #[test]
    fn entry_is_rejected_while_calculating() {
        let mut coordinator = FakeCoordinator::default();
        let (mut lottery, _) = calculating_lottery(&mut coordinator);
        assert_eq!(
            enter(&mut lottery, Pubkey::new_unique(), FEE),
            Err(LotteryError::RoundNotOpen)
        );
        assert_eq!(
            enter(&mut lottery, Pubkey::new_unique(), FEE * 10),
            Err(LotteryError::RoundNotOpen)
        );
        assert_eq!(lottery.entrant_count(), 1);
    }

    #[test]
    fn upkeep_needs_every_condition() {
        let mut lottery = new_lottery();

        // nobody entered
        let status = check_upkeep(&lottery, due());
        assert!(!status.upkeep_needed);
        assert!(status.is_open && status.time_passed);
        assert!(!status.has_balance && !status.has_entrants);

        enter(&mut lottery, Pubkey::new_unique(), FEE).unwrap();

        // interval not over yet, including the exact boundary
        assert!(!check_upkeep(&lottery, START + INTERVAL as i64 - 10).upkeep_needed);
        let boundary = check_upkeep(&lottery, START + INTERVAL as i64);
        assert!(!boundary.upkeep_needed && !boundary.time_passed);

        // clock behind the last settlement
        assert!(!check_upkeep(&lottery, START - 5).time_passed);

        let status = check_upkeep(&lottery, due());
        assert_eq!(
            status,
            UpkeepStatus {
                upkeep_needed: true,
                is_open: true,
                time_passed: true,
                has_balance: true,
                has_entrants: true,
            }
        );

        // not open
        lottery.state = LotteryState::Calculating;
        let status = check_upkeep(&lottery, due());
        assert!(!status.upkeep_needed && !status.is_open);
    }

    #[test]
    fn check_upkeep_does_not_mutate() {
        let mut lottery = new_lottery();
        enter(&mut lottery, Pubkey::new_unique(), FEE).unwrap();
        let before = lottery.clone();
        check_upkeep(&lottery, due());
        assert_eq!(lottery, before);
    }

    #[test]
    fn perform_upkeep_fails_exactly_when_check_upkeep_is_false() {
        let mut coordinator = FakeCoordinator::default();
        let mut lottery = new_lottery();
        assert_eq!(
            perform_upkeep(&mut lottery, due(), &mut coordinator),
            Err(LotteryError::UpkeepNotNeeded {
                state: LotteryState::Open,
                balance: 0,
                entrants: 0,
                elapsed: INTERVAL as i64 + 1,
            })
        );

        enter(&mut lottery, Pubkey::new_unique(), FEE).unwrap();
        let early = START + 5;
        assert!(!check_upkeep(&lottery, early).upkeep_needed);
        assert!(matches!(
            perform_upkeep(&mut lottery, early, &mut coordinator),
            Err(LotteryError::UpkeepNotNeeded { elapsed: 5, .. })
        ));
        assert!(coordinator.requests.is_empty());
        assert_eq!(lottery.lottery_state(), LotteryState::Open);

        assert!(check_upkeep(&lottery, due()).upkeep_needed);
        assert!(perform_upkeep(&mut lottery, due(), &mut coordinator).is_ok());
    }

    #[test]
    fn perform_upkeep_requests_randomness_once() {
        let mut coordinator = FakeCoordinator::default();
        let (mut lottery, _) = calculating_lottery(&mut coordinator);

        assert_eq!(lottery.lottery_state(), LotteryState::Calculating);
        assert_eq!(lottery.pending_request_id(), Some(1));
        assert_eq!(
            coordinator.requests,
            vec![RandomWordsRequest {
                key_hash: [3u8; 32],
                subscription_id: 588,
                request_confirmations: 3,
                callback_gas_limit: 500_000,
                num_words: 1,
            }]
        );

        // the state gate blocks a second request
        assert!(matches!(
            perform_upkeep(&mut lottery, due() + 100, &mut coordinator),
            Err(LotteryError::UpkeepNotNeeded {
                state: LotteryState::Calculating,
                ..
            })
        ));
        assert_eq!(coordinator.requests.len(), 1);
        assert_eq!(lottery.pending_request_id(), Some(1));
    }

    #[test]
    fn failed_request_keeps_round_open() {
        let mut lottery = new_lottery();
        enter(&mut lottery, Pubkey::new_unique(), FEE).unwrap();
        let before = lottery.clone();
        assert_eq!(
            perform_upkeep(&mut lottery, due(), &mut FailingCoordinator),
            Err(LotteryError::InvalidCoordinatorResponse)
        );
        assert_eq!(lottery, before);
    }

    #[test]
    fn mismatched_fulfillment_is_rejected() {
        let mut coordinator = FakeCoordinator::default();
        let (mut lottery, _) = calculating_lottery(&mut coordinator);
        let before = lottery.clone();
        let mut bank = FakeBank::default();

        assert_eq!(
            fulfill_random_words(&mut lottery, 2, &[word(5)], due(), &mut bank),
            Err(LotteryError::UnrecognizedRequest)
        );
        assert_eq!(
            fulfill_random_words(&mut lottery, 0, &[word(5)], due(), &mut bank),
            Err(LotteryError::UnrecognizedRequest)
        );
        assert_eq!(lottery, before);
        assert!(bank.balances.is_empty());
    }

    #[test]
    fn fulfillment_without_outstanding_request_is_rejected() {
        let mut lottery = new_lottery();
        enter(&mut lottery, Pubkey::new_unique(), FEE).unwrap();
        assert_eq!(
            fulfill_random_words(&mut lottery, 0, &[word(1)], due(), &mut FakeBank::default()),
            Err(LotteryError::UnrecognizedRequest)
        );
        assert_eq!(lottery.lottery_state(), LotteryState::Open);
    }

    #[test]
    fn fulfillment_needs_a_word() {
        let mut coordinator = FakeCoordinator::default();
        let (mut lottery, _) = calculating_lottery(&mut coordinator);
        assert_eq!(
            fulfill_random_words(&mut lottery, 1, &[], due(), &mut FakeBank::default()),
            Err(LotteryError::NoRandomWords)
        );
        assert_eq!(lottery.lottery_state(), LotteryState::Calculating);
    }

    #[test]
    fn picks_a_winner_resets_and_sends_money() {
        let mut coordinator = FakeCoordinator::default();
        let mut bank = FakeBank::default();
        let mut lottery = new_lottery();
        let players = players(4);
        for player in &players {
            enter(&mut lottery, *player, FEE).unwrap();
        }
        assert_eq!(lottery.pot(), 400);

        let event = perform_upkeep(&mut lottery, due(), &mut coordinator).unwrap();
        let request_id = match event {
            LotteryEvent::RequestedLotteryWinner { request_id } => request_id,
            other => panic!("unexpected event {:?}", other),
        };

        let settled_at = due() + 60;
        let random = 4_000_000_006u64;
        let event =
            fulfill_random_words(&mut lottery, request_id, &[word(random)], settled_at, &mut bank)
                .unwrap();

        let expected = players[(random % 4) as usize];
        assert_eq!(
            event,
            LotteryEvent::WinnerPicked {
                winner: expected,
                amount: 400
            }
        );
        assert_eq!(lottery.lottery_state(), LotteryState::Open);
        assert_eq!(lottery.entrant_count(), 0);
        assert_eq!(lottery.recent_winner(), &expected);
        assert_eq!(lottery.pot(), 0);
        assert_eq!(lottery.pending_request_id(), None);
        assert!(lottery.last_timestamp() >= settled_at);
        assert_eq!(bank.balances.get(&expected), Some(&400));
        assert_eq!(bank.balances.len(), 1);
    }

    #[test]
    fn only_the_first_word_decides() {
        let mut coordinator = FakeCoordinator::default();
        let mut lottery = new_lottery();
        let players = players(3);
        for player in &players {
            enter(&mut lottery, *player, FEE).unwrap();
        }
        perform_upkeep(&mut lottery, due(), &mut coordinator).unwrap();
        fulfill_random_words(
            &mut lottery,
            1,
            &[word(4), word(2)],
            due(),
            &mut FakeBank::default(),
        )
        .unwrap();
        assert_eq!(lottery.recent_winner(), &players[1]);
    }

    #[test]
    fn failed_payout_rolls_the_settlement_back() {
        let mut coordinator = FakeCoordinator::default();
        let (mut lottery, _) = calculating_lottery(&mut coordinator);
        let before = lottery.clone();
        let mut bank = FakeBank {
            reject: true,
            ..FakeBank::default()
        };

        assert_eq!(
            fulfill_random_words(&mut lottery, 1, &[word(0)], due() + 5, &mut bank),
            Err(LotteryError::PrizeTransferFailed)
        );
        assert_eq!(lottery, before);
        assert_eq!(lottery.lottery_state(), LotteryState::Calculating);
        assert_eq!(lottery.entrant_count(), 1);

        // the draw can still be completed once the payout goes through
        bank.reject = false;
        fulfill_random_words(&mut lottery, 1, &[word(0)], due() + 5, &mut bank).unwrap();
        assert_eq!(lottery.lottery_state(), LotteryState::Open);
    }

    #[test]
    fn settled_request_id_cannot_be_replayed() {
        let mut coordinator = FakeCoordinator::default();
        let mut bank = FakeBank::default();
        let (mut lottery, player) = calculating_lottery(&mut coordinator);
        fulfill_random_words(&mut lottery, 1, &[word(9)], due(), &mut bank).unwrap();
        assert_eq!(bank.balances.get(&player), Some(&FEE));

        // replay before the next request
        assert_eq!(
            fulfill_random_words(&mut lottery, 1, &[word(9)], due(), &mut bank),
            Err(LotteryError::UnrecognizedRequest)
        );

        // next round
        enter(&mut lottery, Pubkey::new_unique(), FEE).unwrap();
        let next_due = due() + INTERVAL as i64 + 1;
        perform_upkeep(&mut lottery, next_due, &mut coordinator).unwrap();
        assert_eq!(lottery.pending_request_id(), Some(2));
        assert_eq!(
            fulfill_random_words(&mut lottery, 1, &[word(9)], next_due, &mut bank),
            Err(LotteryError::UnrecognizedRequest)
        );
        assert_eq!(lottery.lottery_state(), LotteryState::Calculating);
    }
}
