use borsh::BorshSerialize;
use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::ProgramResult,
    msg,
    program::{invoke, set_return_data},
    program_error::ProgramError,
    program_pack::IsInitialized,
    pubkey::Pubkey,
    system_instruction, system_program,
    sysvar::{clock::Clock, rent::Rent, Sysvar},
};

use crate::{
    draw::{self, PrizeTransfer},
    error::LotteryError,
    instruction::LotteryInstruction,
    state::{Lottery, LotteryConfig, ENTRANT_LEN},
    vrf::CoordinatorClient,
};

pub struct Processor;

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = LotteryInstruction::unpack(instruction_data)?;

        let result = match instruction {
            LotteryInstruction::Initialize { config } => {
                msg!("Instruction: Initialize");
                Self::process_initialize(program_id, accounts, config)
            }
            LotteryInstruction::Enter { amount } => {
                msg!("Instruction: Enter");
                Self::process_enter(program_id, accounts, amount)
            }
            LotteryInstruction::CheckUpkeep => {
                msg!("Instruction: Check Upkeep");
                Self::process_check_upkeep(program_id, accounts)
            }
            LotteryInstruction::PerformUpkeep => {
                msg!("Instruction: Perform Upkeep");
                Self::process_perform_upkeep(program_id, accounts)
            }
            LotteryInstruction::FulfillRandomWords {
                request_id,
                random_words,
            } => {
                msg!("Instruction: Fulfill Random Words");
                Self::process_fulfill_random_words(program_id, accounts, request_id, &random_words)
            }
        };

        result.map_err(|error| {
            msg!("Error: {}", error);
            error.into()
        })
    }

    fn process_initialize(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        config: LotteryConfig,
    ) -> Result<(), LotteryError> {
        let account_info_iter = &mut accounts.iter();
        let authority_info = next_account_info(account_info_iter)?;
        let lottery_info = next_account_info(account_info_iter)?;

        if !authority_info.is_signer {
            msg!("Authority must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature.into());
        }
        if lottery_info.owner != program_id {
            msg!("Lottery account must be owned by this program");
            return Err(ProgramError::IncorrectProgramId.into());
        }
        if !lottery_info.is_writable {
            msg!("Lottery account must be writable");
            return Err(ProgramError::InvalidArgument.into());
        }
        if Lottery::is_initialized_data(&lottery_info.data.borrow()) {
            return Err(LotteryError::AlreadyInitialized);
        }

        let data_len = lottery_info.data_len();
        let capacity = data_len.saturating_sub(Lottery::HEADER_LEN) / ENTRANT_LEN;
        if capacity == 0 {
            msg!(
                "Lottery account needs at least {} bytes, has {}",
                Lottery::space(1),
                data_len
            );
            return Err(ProgramError::AccountDataTooSmall.into());
        }
        if !Rent::get()?.is_exempt(lottery_info.lamports(), data_len) {
            msg!("Lottery account must be rent exempt");
            return Err(ProgramError::AccountNotRentExempt.into());
        }
        config.validate()?;

        let now = Clock::get()?.unix_timestamp;
        let lottery = Lottery::new(*authority_info.key, config, now, capacity);
        lottery.pack_into(&mut lottery_info.data.borrow_mut())?;

        msg!(
            "Lottery initialized: fee={} lamports, interval={}s, capacity={}, coordinator={}",
            config.entrance_fee,
            config.interval,
            capacity,
            config.coordinator
        );
        Ok(())
    }

    fn process_enter(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        amount: u64,
    ) -> Result<(), LotteryError> {
        let account_info_iter = &mut accounts.iter();
        let player_info = next_account_info(account_info_iter)?;
        let lottery_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        if !player_info.is_signer {
            msg!("Player must sign the transaction");
            return Err(ProgramError::MissingRequiredSignature.into());
        }
        if *system_program_info.key != system_program::id() {
            msg!("Expected the system program");
            return Err(ProgramError::IncorrectProgramId.into());
        }
        let mut lottery = Self::load_lottery(program_id, lottery_info)?;

        let event = draw::enter(&mut lottery, *player_info.key, amount)?;

        invoke(
            &system_instruction::transfer(player_info.key, lottery_info.key, amount),
            &[
                player_info.clone(),
                lottery_info.clone(),
                system_program_info.clone(),
            ],
        )?;

        lottery.pack_into(&mut lottery_info.data.borrow_mut())?;
        event.emit()?;
        Ok(())
    }

    fn process_check_upkeep(program_id: &Pubkey, accounts: &[AccountInfo]) -> Result<(), LotteryError> {
        let account_info_iter = &mut accounts.iter();
        let lottery_info = next_account_info(account_info_iter)?;

        let lottery = Self::load_lottery(program_id, lottery_info)?;
        let status = draw::check_upkeep(&lottery, Clock::get()?.unix_timestamp);
        msg!("Upkeep status: {:?}", status);

        let data = status
            .try_to_vec()
            .map_err(|e| ProgramError::BorshIoError(e.to_string()))?;
        set_return_data(&data);
        Ok(())
    }

    fn process_perform_upkeep(program_id: &Pubkey, accounts: &[AccountInfo]) -> Result<(), LotteryError> {
        let account_info_iter = &mut accounts.iter();
        let lottery_info = next_account_info(account_info_iter)?;
        let coordinator_info = next_account_info(account_info_iter)?;
        let coordinator_accounts = account_info_iter.as_slice();

        let mut lottery = Self::load_lottery(program_id, lottery_info)?;
        if *coordinator_info.key != lottery.config.coordinator {
            msg!(
                "Coordinator {} does not match configured {}",
                coordinator_info.key,
                lottery.config.coordinator
            );
            return Err(LotteryError::InvalidCoordinator);
        }

        let now = Clock::get()?.unix_timestamp;
        let mut coordinator = CoordinatorClient::new(coordinator_info, coordinator_accounts);
        let event = draw::perform_upkeep(&mut lottery, now, &mut coordinator)?;

        lottery.pack_into(&mut lottery_info.data.borrow_mut())?;
        event.emit()?;
        Ok(())
    }

    fn process_fulfill_random_words(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        request_id: u64,
        random_words: &[[u8; 32]],
    ) -> Result<(), LotteryError> {
        let account_info_iter = &mut accounts.iter();
        let oracle_info = next_account_info(account_info_iter)?;
        let lottery_info = next_account_info(account_info_iter)?;
        let winner_info = next_account_info(account_info_iter)?;

        let mut lottery = Self::load_lottery(program_id, lottery_info)?;
        if !oracle_info.is_signer || *oracle_info.key != lottery.config.oracle_authority {
            msg!("Fulfillment must be signed by {}", lottery.config.oracle_authority);
            return Err(LotteryError::OnlyCoordinatorCanFulfill);
        }
        let now = Clock::get()?.unix_timestamp;
        let mut payout = LamportPayout {
            lottery: lottery_info,
            winner: winner_info,
        };
        let event = draw::fulfill_random_words(&mut lottery, request_id, random_words, now, &mut payout)?;

        lottery.pack_into(&mut lottery_info.data.borrow_mut())?;
        event.emit()?;
        Ok(())
    }

    fn load_lottery(program_id: &Pubkey, lottery_info: &AccountInfo) -> Result<Lottery, LotteryError> {
        if lottery_info.owner != program_id {
            msg!("Lottery account must be owned by this program");
            return Err(ProgramError::IncorrectProgramId.into());
        }
        let lottery = Lottery::unpack(&lottery_info.data.borrow())?;
        if !lottery.is_initialized() {
            return Err(LotteryError::NotInitialized);
        }
        Ok(lottery)
    }
}

/// Pays the pot straight out of the lottery account's lamports. Only the
/// pot is moved, the rent-exempt reserve stays behind.
struct LamportPayout<'a, 'b> {
    lottery: &'a AccountInfo<'b>,
    winner: &'a AccountInfo<'b>,
}

impl<'a, 'b> PrizeTransfer for LamportPayout<'a, 'b> {
    fn transfer_prize(&mut self, winner: &Pubkey, amount: u64) -> Result<(), LotteryError> {
        if winner != self.winner.key {
            msg!("Winner is {}, got account {}", winner, self.winner.key);
            return Err(LotteryError::WinnerAccountMismatch);
        }
        if !self.winner.is_writable {
            msg!("Winner account must be writable");
            return Err(ProgramError::InvalidArgument.into());
        }

        let lottery_balance = self
            .lottery
            .lamports()
            .checked_sub(amount)
            .ok_or(LotteryError::PrizeTransferFailed)?;
        let winner_balance = self
            .winner
            .lamports()
            .checked_add(amount)
            .ok_or(LotteryError::AmountOverflow)?;

        **self.lottery.try_borrow_mut_lamports()? = lottery_balance;
        **self.winner.try_borrow_mut_lamports()? = winner_balance;
        msg!("Transferred {} lamports to {}", amount, winner);
        Ok(())
    }
}
