// VRF lottery program
// Players pay into a round; once the interval has passed anyone can close it
// and a VRF coordinator picks the winner, who receives the whole pot.

pub mod draw;
pub mod entrypoint;
pub mod error;
pub mod events;
pub mod instruction;
pub mod processor;
pub mod state;
pub mod utils;
pub mod vrf;

use solana_program::{account_info::AccountInfo, entrypoint::ProgramResult, pubkey::Pubkey};

/// Library entry, used by program tests to register the processor
pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    processor::Processor::process(program_id, accounts, instruction_data)
}
