use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    entrypoint::ProgramResult, log::sol_log_data, msg, program_error::ProgramError,
    pubkey::Pubkey,
};

use crate::utils::lamports_to_sol;

/// Notifications published for off-chain observers.
///
/// Each event is written twice: a readable `msg!` line and a
/// `sol_log_data` record holding the borsh encoding, whose leading byte is
/// the variant index.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum LotteryEvent {
    /// A player joined the current round
    LotteryEnter { player: Pubkey, amount: u64 },
    /// Entries closed and randomness was requested
    RequestedLotteryWinner { request_id: u64 },
    /// Round settled and the pot was paid out
    WinnerPicked { winner: Pubkey, amount: u64 },
}

impl LotteryEvent {
    pub fn emit(&self) -> ProgramResult {
        match self {
            LotteryEvent::LotteryEnter { player, amount } => {
                msg!("LotteryEnter: {} paid {} SOL", player, lamports_to_sol(*amount))
            }
            LotteryEvent::RequestedLotteryWinner { request_id } => {
                msg!("RequestedLotteryWinner: request id {}", request_id)
            }
            LotteryEvent::WinnerPicked { winner, amount } => {
                msg!("WinnerPicked: {} won {} SOL", winner, lamports_to_sol(*amount))
            }
        }

        sol_log_data(&[&self.data()?]);
        Ok(())
    }

    /// Payload of the `sol_log_data` record
    pub fn data(&self) -> Result<Vec<u8>, ProgramError> {
        self.try_to_vec()
            .map_err(|e| ProgramError::BorshIoError(e.to_string()))
    }
}
