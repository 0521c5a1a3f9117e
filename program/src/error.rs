use solana_program::{decode_error::DecodeError, program_error::ProgramError};
use thiserror::Error;

use crate::state::LotteryState;

/// Errors that may be returned by the lottery program
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LotteryError {
    /// Lottery account was initialized before
    #[error("Lottery account already initialized")]
    AlreadyInitialized,

    /// Lottery account holds no lottery
    #[error("Lottery account not initialized")]
    NotInitialized,

    /// Configuration rejected at construction
    #[error("Invalid lottery configuration")]
    InvalidConfig,

    /// Entry payment below the entrance fee
    #[error("Not enough funds to enter the lottery")]
    NotEnoughFunds,

    /// Round is calculating a winner
    #[error("Lottery round is not open")]
    RoundNotOpen,

    /// No free entrant slot left in the lottery account
    #[error("Lottery account has no room for another entrant")]
    LotteryFull,

    /// Upkeep conditions do not hold
    #[error(
        "Upkeep not needed: state={state:?}, balance={balance}, entrants={entrants}, elapsed={elapsed}s"
    )]
    UpkeepNotNeeded {
        state: LotteryState,
        balance: u64,
        entrants: u32,
        elapsed: i64,
    },

    /// Fulfillment for a request that is not outstanding
    #[error("Unrecognized randomness request")]
    UnrecognizedRequest,

    /// Fulfillment not signed by the configured oracle
    #[error("Only the coordinator can fulfill randomness requests")]
    OnlyCoordinatorCanFulfill,

    /// Fulfillment carried no random word
    #[error("Fulfillment carried no random words")]
    NoRandomWords,

    /// Coordinator account differs from the configured one
    #[error("Coordinator program does not match the lottery configuration")]
    InvalidCoordinator,

    /// Coordinator returned no usable request id
    #[error("Coordinator did not return a request id")]
    InvalidCoordinatorResponse,

    /// Entrant lookup past the end of the list
    #[error("Entrant index out of range")]
    EntrantIndexOutOfRange,

    /// Winner account supplied does not belong to the selected entrant
    #[error("Winner account does not match the selected entrant")]
    WinnerAccountMismatch,

    /// Pot could not be paid out
    #[error("Prize transfer failed")]
    PrizeTransferFailed,

    /// Lamport arithmetic overflowed
    #[error("Amount overflow")]
    AmountOverflow,

    /// Failure raised by the runtime itself
    #[error(transparent)]
    Program(#[from] ProgramError),
}

impl From<LotteryError> for ProgramError {
    /// Custom codes are stable and reported to clients. Runtime errors keep
    /// their own encoding.
    fn from(e: LotteryError) -> Self {
        let code = match e {
            LotteryError::Program(inner) => return inner,
            LotteryError::AlreadyInitialized => 0,
            LotteryError::NotInitialized => 1,
            LotteryError::InvalidConfig => 2,
            LotteryError::NotEnoughFunds => 3,
            LotteryError::RoundNotOpen => 4,
            LotteryError::LotteryFull => 5,
            LotteryError::UpkeepNotNeeded { .. } => 6,
            LotteryError::UnrecognizedRequest => 7,
            LotteryError::OnlyCoordinatorCanFulfill => 8,
            LotteryError::NoRandomWords => 9,
            LotteryError::InvalidCoordinator => 10,
            LotteryError::InvalidCoordinatorResponse => 11,
            LotteryError::EntrantIndexOutOfRange => 12,
            LotteryError::WinnerAccountMismatch => 13,
            LotteryError::PrizeTransferFailed => 14,
            LotteryError::AmountOverflow => 15,
        };
        ProgramError::Custom(code)
    }
}

impl<T> DecodeError<T> for LotteryError {
    fn type_of() -> &'static str {
        "Lottery Error"
    }
}
