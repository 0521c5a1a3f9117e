// VRF coordinator integration for the lottery program
use arrayref::array_ref;
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    account_info::AccountInfo,
    instruction::{AccountMeta, Instruction},
    msg,
    program::{get_return_data, invoke},
    program_error::ProgramError,
    pubkey::Pubkey,
};

use crate::error::LotteryError;

/// Instruction tag a coordinator program dispatches randomness requests on
pub const REQUEST_RANDOM_WORDS: u8 = 0;

/// Parameters of a single randomness request
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct RandomWordsRequest {
    pub key_hash: [u8; 32],
    pub subscription_id: u64,
    pub request_confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
}

impl RandomWordsRequest {
    /// Instruction data sent to the coordinator
    pub fn pack(&self) -> Result<Vec<u8>, ProgramError> {
        let mut buf = vec![REQUEST_RANDOM_WORDS];
        self.serialize(&mut buf)
            .map_err(|e| ProgramError::BorshIoError(e.to_string()))?;
        Ok(buf)
    }

    /// Decode coordinator instruction data, for coordinator implementations
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let (tag, rest) = input
            .split_first()
            .ok_or(ProgramError::InvalidInstructionData)?;
        if *tag != REQUEST_RANDOM_WORDS {
            return Err(ProgramError::InvalidInstructionData);
        }
        Self::try_from_slice(rest).map_err(|_| ProgramError::InvalidInstructionData)
    }
}

/// The oracle side of the request phase. Fulfillment arrives later as its
/// own instruction, correlated by the returned id.
pub trait RandomnessCoordinator {
    fn request_random_words(&mut self, request: &RandomWordsRequest) -> Result<u64, LotteryError>;
}

/// Reaches the coordinator program through CPI. The coordinator answers
/// with the request id as 8 little-endian bytes of return data.
pub struct CoordinatorClient<'a, 'b> {
    program: &'a AccountInfo<'b>,
    accounts: &'a [AccountInfo<'b>],
}

impl<'a, 'b> CoordinatorClient<'a, 'b> {
    /// `accounts` are forwarded to the coordinator untouched
    pub fn new(program: &'a AccountInfo<'b>, accounts: &'a [AccountInfo<'b>]) -> Self {
        Self { program, accounts }
    }
}

impl<'a, 'b> RandomnessCoordinator for CoordinatorClient<'a, 'b> {
    fn request_random_words(&mut self, request: &RandomWordsRequest) -> Result<u64, LotteryError> {
        let instruction = Instruction {
            program_id: *self.program.key,
            accounts: self
                .accounts
                .iter()
                .map(|acc| AccountMeta {
                    pubkey: *acc.key,
                    is_signer: acc.is_signer,
                    is_writable: acc.is_writable,
                })
                .collect(),
            data: request.pack()?,
        };

        let mut account_infos = self.accounts.to_vec();
        account_infos.push(self.program.clone());
        invoke(&instruction, &account_infos)?;

        let (program_id, data) = get_return_data().ok_or_else(|| {
            msg!("Coordinator returned no data");
            LotteryError::InvalidCoordinatorResponse
        })?;
        decode_request_id(self.program.key, &program_id, &data)
    }
}

/// Decode the request id from coordinator return data
pub fn decode_request_id(
    coordinator: &Pubkey,
    returned_by: &Pubkey,
    data: &[u8],
) -> Result<u64, LotteryError> {
    if returned_by != coordinator {
        msg!("Return data set by {} instead of the coordinator", returned_by);
        return Err(LotteryError::InvalidCoordinatorResponse);
    }
    if data.len() != 8 {
        msg!("Expected an 8 byte request id, got {} bytes", data.len());
        return Err(LotteryError::InvalidCoordinatorResponse);
    }
    Ok(u64::from_le_bytes(*array_ref![data, 0, 8]))
}
