use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    clock::UnixTimestamp,
    program_error::ProgramError,
    program_pack::IsInitialized,
    pubkey::Pubkey,
};

use crate::error::LotteryError;

/// Entrance fee used by the reference deployment (0.1 SOL)
pub const DEFAULT_ENTRANCE_FEE: u64 = 100_000_000;
/// Seconds a round stays open before upkeep may close it
pub const DEFAULT_INTERVAL: u64 = 30;
pub const DEFAULT_CALLBACK_GAS_LIMIT: u32 = 500_000;
pub const DEFAULT_REQUEST_CONFIRMATIONS: u16 = 3;
pub const DEFAULT_NUM_WORDS: u32 = 1;

/// Size of one entrant slot
pub const ENTRANT_LEN: usize = 32;

/// Round state of the lottery
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LotteryState {
    /// Accepting entries
    Open,
    /// Entries closed, waiting for the oracle to deliver randomness
    Calculating,
}

impl TryFrom<u8> for LotteryState {
    type Error = ProgramError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(LotteryState::Open),
            1 => Ok(LotteryState::Calculating),
            _ => Err(ProgramError::InvalidAccountData),
        }
    }
}

impl From<LotteryState> for u8 {
    fn from(state: LotteryState) -> Self {
        match state {
            LotteryState::Open => 0,
            LotteryState::Calculating => 1,
        }
    }
}

/// Deployment-time configuration. Stored once by `Initialize` and never
/// rewritten afterwards.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LotteryConfig {
    /// Minimum lamports per entry
    pub entrance_fee: u64,
    /// Seconds that must elapse after the last settlement before a draw
    pub interval: u64,
    /// VRF coordinator program receiving randomness requests
    pub coordinator: Pubkey,
    /// Key the oracle signs fulfillments with
    pub oracle_authority: Pubkey,
    /// Oracle key identifier ("gas lane")
    pub key_hash: [u8; 32],
    /// Oracle subscription paying for requests
    pub subscription_id: u64,
    /// Confirmations the oracle waits before answering
    pub request_confirmations: u16,
    /// Compute budget granted to the fulfillment callback
    pub callback_gas_limit: u32,
    /// Random words asked for per request
    pub num_words: u32,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            entrance_fee: DEFAULT_ENTRANCE_FEE,
            interval: DEFAULT_INTERVAL,
            coordinator: Pubkey::default(),
            oracle_authority: Pubkey::default(),
            key_hash: [0u8; 32],
            subscription_id: 0,
            request_confirmations: DEFAULT_REQUEST_CONFIRMATIONS,
            callback_gas_limit: DEFAULT_CALLBACK_GAS_LIMIT,
            num_words: DEFAULT_NUM_WORDS,
        }
    }
}

impl LotteryConfig {
    pub fn validate(&self) -> Result<(), LotteryError> {
        if self.entrance_fee == 0 || self.num_words == 0 {
            return Err(LotteryError::InvalidConfig);
        }
        Ok(())
    }
}

/// Result of evaluating the upkeep predicate, with each component kept for
/// diagnostics.
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpkeepStatus {
    pub upkeep_needed: bool,
    pub is_open: bool,
    pub time_passed: bool,
    pub has_balance: bool,
    pub has_entrants: bool,
}

/// Lottery account data.
///
/// Laid out as a fixed header followed by `capacity` entrant slots of
/// 32 bytes each. Slots past `entrants.len()` hold no meaning.
#[derive(Clone, Debug, PartialEq)]
pub struct Lottery {
    /// Is the account initialized
    pub is_initialized: bool,
    /// Key that initialized the lottery
    pub authority: Pubkey,
    pub config: LotteryConfig,
    pub state: LotteryState,
    /// Start of the current waiting window, moved forward on each settlement
    pub last_timestamp: UnixTimestamp,
    /// Lamports collected since the last settlement
    pub pot: u64,
    /// Request id the oracle is expected to answer
    pub pending_request_id: Option<u64>,
    /// Winner of the last settled round (zero before the first one)
    pub recent_winner: Pubkey,
    /// Entrants of the current round, in entry order
    pub entrants: Vec<Pubkey>,
    /// Number of entrant slots available in the account
    pub capacity: usize,
}

impl IsInitialized for Lottery {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl Lottery {
    pub const HEADER_LEN: usize =
        1 + 32 + 8 + 8 + 32 + 32 + 32 + 8 + 2 + 4 + 4 + 1 + 8 + 8 + 1 + 8 + 32 + 4;

    /// Account size needed for a lottery holding `capacity` entrants
    pub fn space(capacity: usize) -> usize {
        Self::HEADER_LEN + capacity * ENTRANT_LEN
    }

    /// Fresh lottery, open from `now`
    pub fn new(authority: Pubkey, config: LotteryConfig, now: UnixTimestamp, capacity: usize) -> Self {
        Self {
            is_initialized: true,
            authority,
            config,
            state: LotteryState::Open,
            last_timestamp: now,
            pot: 0,
            pending_request_id: None,
            recent_winner: Pubkey::default(),
            entrants: Vec::new(),
            capacity,
        }
    }

    pub fn lottery_state(&self) -> LotteryState {
        self.state
    }

    pub fn entrance_fee(&self) -> u64 {
        self.config.entrance_fee
    }

    pub fn interval(&self) -> u64 {
        self.config.interval
    }

    pub fn callback_gas_limit(&self) -> u32 {
        self.config.callback_gas_limit
    }

    pub fn request_confirmations(&self) -> u16 {
        self.config.request_confirmations
    }

    pub fn num_words(&self) -> u32 {
        self.config.num_words
    }

    pub fn entrant(&self, index: usize) -> Result<&Pubkey, LotteryError> {
        self.entrants
            .get(index)
            .ok_or(LotteryError::EntrantIndexOutOfRange)
    }

    pub fn entrant_count(&self) -> usize {
        self.entrants.len()
    }

    pub fn last_timestamp(&self) -> UnixTimestamp {
        self.last_timestamp
    }

    pub fn recent_winner(&self) -> &Pubkey {
        &self.recent_winner
    }

    pub fn pot(&self) -> u64 {
        self.pot
    }

    pub fn pending_request_id(&self) -> Option<u64> {
        self.pending_request_id
    }

    /// Reads only the initialized flag, so a zeroed account can be told
    /// apart without decoding the rest.
    pub fn is_initialized_data(src: &[u8]) -> bool {
        src.first().map_or(false, |flag| *flag != 0)
    }

    pub fn unpack(src: &[u8]) -> Result<Self, ProgramError> {
        if src.len() < Self::HEADER_LEN {
            return Err(ProgramError::AccountDataTooSmall);
        }
        let (header, slots) = src.split_at(Self::HEADER_LEN);
        let header = array_ref![header, 0, Lottery::HEADER_LEN];
        let (
            is_initialized,
            authority,
            entrance_fee,
            interval,
            coordinator,
            oracle_authority,
            key_hash,
            subscription_id,
            request_confirmations,
            callback_gas_limit,
            num_words,
            state,
            last_timestamp,
            pot,
            has_pending_request,
            pending_request_id,
            recent_winner,
            entrant_count,
        ) = array_refs![header, 1, 32, 8, 8, 32, 32, 32, 8, 2, 4, 4, 1, 8, 8, 1, 8, 32, 4];

        let capacity = slots.len() / ENTRANT_LEN;
        let entrant_count = u32::from_le_bytes(*entrant_count) as usize;
        if entrant_count > capacity {
            return Err(ProgramError::InvalidAccountData);
        }

        let entrants = slots
            .chunks_exact(ENTRANT_LEN)
            .take(entrant_count)
            .map(|slot| Pubkey::new_from_array(*array_ref![slot, 0, ENTRANT_LEN]))
            .collect();

        let pending_request_id = match has_pending_request[0] {
            0 => None,
            1 => Some(u64::from_le_bytes(*pending_request_id)),
            _ => return Err(ProgramError::InvalidAccountData),
        };

        Ok(Lottery {
            is_initialized: is_initialized[0] != 0,
            authority: Pubkey::new_from_array(*authority),
            config: LotteryConfig {
                entrance_fee: u64::from_le_bytes(*entrance_fee),
                interval: u64::from_le_bytes(*interval),
                coordinator: Pubkey::new_from_array(*coordinator),
                oracle_authority: Pubkey::new_from_array(*oracle_authority),
                key_hash: *key_hash,
                subscription_id: u64::from_le_bytes(*subscription_id),
                request_confirmations: u16::from_le_bytes(*request_confirmations),
                callback_gas_limit: u32::from_le_bytes(*callback_gas_limit),
                num_words: u32::from_le_bytes(*num_words),
            },
            state: LotteryState::try_from(state[0])?,
            last_timestamp: UnixTimestamp::from_le_bytes(*last_timestamp),
            pot: u64::from_le_bytes(*pot),
            pending_request_id,
            recent_winner: Pubkey::new_from_array(*recent_winner),
            entrants,
            capacity,
        })
    }

    pub fn pack_into(&self, dst: &mut [u8]) -> Result<(), ProgramError> {
        if dst.len() < Self::space(self.entrants.len()) {
            return Err(ProgramError::AccountDataTooSmall);
        }
        let entrant_count =
            u32::try_from(self.entrants.len()).map_err(|_| ProgramError::InvalidAccountData)?;
        let (header, slots) = dst.split_at_mut(Self::HEADER_LEN);
        let header = array_mut_ref![header, 0, Lottery::HEADER_LEN];
        let (
            is_initialized_dst,
            authority_dst,
            entrance_fee_dst,
            interval_dst,
            coordinator_dst,
            oracle_authority_dst,
            key_hash_dst,
            subscription_id_dst,
            request_confirmations_dst,
            callback_gas_limit_dst,
            num_words_dst,
            state_dst,
            last_timestamp_dst,
            pot_dst,
            has_pending_request_dst,
            pending_request_id_dst,
            recent_winner_dst,
            entrant_count_dst,
        ) = mut_array_refs![header, 1, 32, 8, 8, 32, 32, 32, 8, 2, 4, 4, 1, 8, 8, 1, 8, 32, 4];

        is_initialized_dst[0] = self.is_initialized as u8;
        authority_dst.copy_from_slice(self.authority.as_ref());
        *entrance_fee_dst = self.config.entrance_fee.to_le_bytes();
        *interval_dst = self.config.interval.to_le_bytes();
        coordinator_dst.copy_from_slice(self.config.coordinator.as_ref());
        oracle_authority_dst.copy_from_slice(self.config.oracle_authority.as_ref());
        *key_hash_dst = self.config.key_hash;
        *subscription_id_dst = self.config.subscription_id.to_le_bytes();
        *request_confirmations_dst = self.config.request_confirmations.to_le_bytes();
        *callback_gas_limit_dst = self.config.callback_gas_limit.to_le_bytes();
        *num_words_dst = self.config.num_words.to_le_bytes();
        state_dst[0] = self.state.into();
        *last_timestamp_dst = self.last_timestamp.to_le_bytes();
        *pot_dst = self.pot.to_le_bytes();
        has_pending_request_dst[0] = self.pending_request_id.is_some() as u8;
        *pending_request_id_dst = self.pending_request_id.unwrap_or_default().to_le_bytes();
        recent_winner_dst.copy_from_slice(self.recent_winner.as_ref());
        *entrant_count_dst = entrant_count.to_le_bytes();

        for (slot, entrant) in slots.chunks_exact_mut(ENTRANT_LEN).zip(self.entrants.iter()) {
            slot.copy_from_slice(entrant.as_ref());
        }
        Ok(())
    }
}
