use arrayref::array_ref;
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program,
};
use std::mem::size_of;

use crate::state::LotteryConfig;

#[derive(Clone, Debug, PartialEq)]
pub enum LotteryInstruction {
    /// Set up a lottery in a pre-allocated account owned by the program.
    /// The account size decides how many entrants a round can hold.
    ///
    /// Accounts expected:
    /// 0. `[signer]` The authority creating the lottery
    /// 1. `[writable]` The lottery account, rent exempt and zeroed
    Initialize {
        /// Deployment configuration, stored once
        config: LotteryConfig,
    },

    /// Pay into the current round
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The player paying the entry
    /// 1. `[writable]` The lottery account
    /// 2. `[]` The system program
    Enter {
        /// Lamports paid, at least the entrance fee
        amount: u64,
    },

    /// Evaluate the upkeep predicate. The status is logged and returned as
    /// borsh-encoded `UpkeepStatus` return data.
    ///
    /// Accounts expected:
    /// 0. `[]` The lottery account
    CheckUpkeep,

    /// Close the round and request randomness from the coordinator
    ///
    /// Accounts expected:
    /// 0. `[writable]` The lottery account
    /// 1. `[]` The VRF coordinator program
    /// Remaining accounts are forwarded to the coordinator
    PerformUpkeep,

    /// Oracle callback delivering the randomness for a request
    ///
    /// Accounts expected:
    /// 0. `[signer]` The oracle authority from the lottery configuration
    /// 1. `[writable]` The lottery account
    /// 2. `[writable]` The winner, the entrant selected by the first word
    FulfillRandomWords {
        request_id: u64,
        random_words: Vec<[u8; 32]>,
    },
}

impl LotteryInstruction {
    /// Unpacks a byte buffer into a LotteryInstruction
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let (tag, rest) = input
            .split_first()
            .ok_or(ProgramError::InvalidInstructionData)?;

        Ok(match tag {
            0 => {
                let config = LotteryConfig::try_from_slice(rest)
                    .map_err(|_| ProgramError::InvalidInstructionData)?;
                Self::Initialize { config }
            }
            1 => {
                let (amount, _) = Self::unpack_u64(rest)?;
                Self::Enter { amount }
            }
            2 => Self::CheckUpkeep,
            3 => Self::PerformUpkeep,
            4 => {
                let (request_id, rest) = Self::unpack_u64(rest)?;
                let (count, rest) = Self::unpack_u32(rest)?;
                let words_len = (count as usize)
                    .checked_mul(32)
                    .ok_or(ProgramError::InvalidInstructionData)?;
                if rest.len() != words_len {
                    return Err(ProgramError::InvalidInstructionData);
                }
                let random_words = rest
                    .chunks_exact(32)
                    .map(|word| *array_ref![word, 0, 32])
                    .collect();
                Self::FulfillRandomWords {
                    request_id,
                    random_words,
                }
            }
            _ => return Err(ProgramError::InvalidInstructionData),
        })
    }

    /// Packs a LotteryInstruction into a byte buffer
    pub fn pack(&self) -> Result<Vec<u8>, ProgramError> {
        let mut buf = Vec::with_capacity(size_of::<Self>());
        match self {
            Self::Initialize { config } => {
                buf.push(0);
                config
                    .serialize(&mut buf)
                    .map_err(|e| ProgramError::BorshIoError(e.to_string()))?;
            }
            Self::Enter { amount } => {
                buf.push(1);
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            Self::CheckUpkeep => buf.push(2),
            Self::PerformUpkeep => buf.push(3),
            Self::FulfillRandomWords {
                request_id,
                random_words,
            } => {
                let count = u32::try_from(random_words.len())
                    .map_err(|_| ProgramError::InvalidInstructionData)?;
                buf.push(4);
                buf.extend_from_slice(&request_id.to_le_bytes());
                buf.extend_from_slice(&count.to_le_bytes());
                for word in random_words {
                    buf.extend_from_slice(word);
                }
            }
        }
        Ok(buf)
    }

    fn unpack_u64(input: &[u8]) -> Result<(u64, &[u8]), ProgramError> {
        if input.len() < 8 {
            return Err(ProgramError::InvalidInstructionData);
        }
        let (value, rest) = input.split_at(8);
        Ok((u64::from_le_bytes(*array_ref![value, 0, 8]), rest))
    }

    fn unpack_u32(input: &[u8]) -> Result<(u32, &[u8]), ProgramError> {
        if input.len() < 4 {
            return Err(ProgramError::InvalidInstructionData);
        }
        let (value, rest) = input.split_at(4);
        Ok((u32::from_le_bytes(*array_ref![value, 0, 4]), rest))
    }
}

/// Create initialize instruction
pub fn initialize(
    program_id: &Pubkey,
    authority: &Pubkey,
    lottery: &Pubkey,
    config: LotteryConfig,
) -> Result<Instruction, ProgramError> {
    let data = LotteryInstruction::Initialize { config }.pack()?;

    let accounts = vec![
        AccountMeta::new_readonly(*authority, true),
        AccountMeta::new(*lottery, false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

/// Create enter instruction
pub fn enter(
    program_id: &Pubkey,
    player: &Pubkey,
    lottery: &Pubkey,
    amount: u64,
) -> Result<Instruction, ProgramError> {
    let data = LotteryInstruction::Enter { amount }.pack()?;

    let accounts = vec![
        AccountMeta::new(*player, true),
        AccountMeta::new(*lottery, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

/// Create check_upkeep instruction
pub fn check_upkeep(program_id: &Pubkey, lottery: &Pubkey) -> Result<Instruction, ProgramError> {
    let data = LotteryInstruction::CheckUpkeep.pack()?;

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![AccountMeta::new_readonly(*lottery, false)],
        data,
    })
}

/// Create perform_upkeep instruction. `coordinator_accounts` are appended
/// as-is and handed to the coordinator program.
pub fn perform_upkeep(
    program_id: &Pubkey,
    lottery: &Pubkey,
    coordinator_program: &Pubkey,
    coordinator_accounts: &[AccountMeta],
) -> Result<Instruction, ProgramError> {
    let data = LotteryInstruction::PerformUpkeep.pack()?;

    let mut accounts = vec![
        AccountMeta::new(*lottery, false),
        AccountMeta::new_readonly(*coordinator_program, false),
    ];
    accounts.extend_from_slice(coordinator_accounts);

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

/// Create fulfill_random_words instruction
pub fn fulfill_random_words(
    program_id: &Pubkey,
    oracle_authority: &Pubkey,
    lottery: &Pubkey,
    winner: &Pubkey,
    request_id: u64,
    random_words: Vec<[u8; 32]>,
) -> Result<Instruction, ProgramError> {
    let data = LotteryInstruction::FulfillRandomWords {
        request_id,
        random_words,
    }
    .pack()?;

    let accounts = vec![
        AccountMeta::new_readonly(*oracle_authority, true),
        AccountMeta::new(*lottery, false),
        AccountMeta::new(*winner, false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}
