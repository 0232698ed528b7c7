//! ABI of the ChallengeFHE contract and helpers for the calls and logs this
//! client deals with.

use crate::consts::{LOCAL_CHAIN_ID, SEPOLIA_CHAIN_ID, SEPOLIA_CHALLENGE_ADDRESS};
use crate::instance::{EncryptedInput, EncryptedInputBuilder, FhevmEncryptor};
use alloy_primitives::{Address, Bytes, LogData, U256};
use alloy_sol_types::{SolCall, SolEvent};
use error_utils::anyhow_error_and_log;
use serde::{Deserialize, Serialize};

alloy_sol_types::sol! {
    interface ChallengeFHE {
        struct Challenge {
            uint256 challengeId;
            address organizer;
            string challengeCID;
            uint256 startTime;
            uint256 endTime;
            uint256 daysTotal;
            uint256 stakeAmount;
            address stakeToken;
            bool requireEvidence;
            uint8 verificationMode;
            uint256 rewardPool;
            bool settled;
        }

        struct ParticipantRecord {
            address participant;
            uint256 joinedAt;
            uint8 status;
            uint256 stakeLocked;
            /// @notice Handle of the encrypted count of approved days.
            bytes32 encryptedSuccessDays;
        }

        event ChallengeCreated(uint256 indexed challengeId, address indexed organizer, string challengeCID);
        event JoinedChallenge(uint256 indexed challengeId, address indexed participant);
        event CheckIn(uint256 indexed challengeId, address indexed participant, uint256 dayIndex, string reportCID);
        event CheckInVerified(uint256 indexed challengeId, address indexed participant, uint256 dayIndex, address indexed verifier, bool approve);
        event ParticipantFailed(uint256 indexed challengeId, address indexed participant, string evidenceCID);
        event ChallengeSettled(uint256 indexed challengeId, uint256 rewardPool, uint256 winnersCount);
        event RewardClaimed(uint256 indexed challengeId, address indexed participant, uint256 amount);

        function createChallenge(
            string challengeCID,
            uint256 startTime,
            uint256 endTime,
            uint256 daysTotal,
            uint256 stakeAmount,
            address stakeToken,
            bool requireEvidence,
            uint8 verificationMode
        ) external payable returns (uint256 challengeId);
        function getChallenge(uint256 challengeId) external view returns (Challenge memory);
        function getEncryptedSuccessDays(uint256 challengeId, address participant) external view returns (bytes32);
        function getParticipantRecord(uint256 challengeId, address participant) external view returns (ParticipantRecord memory);
        function nextChallengeId() external view returns (uint256);
        function joinChallenge(uint256 challengeId) external payable;
        function checkIn(uint256 challengeId, string reportCID, bytes32 encIncrement, bytes inputProof) external;
        function verifyCheckIn(uint256 challengeId, address participant, uint256 dayIndex, bool approve, string evidenceCID) external;
    }
}

/// Where ChallengeFHE is deployed, per supported chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeDeployments {
    /// Deployment on the local development chain, there is no default.
    #[serde(default)]
    pub local: Option<Address>,
    /// Deployment on Sepolia, the known deployment when unset.
    #[serde(default)]
    pub sepolia: Option<Address>,
}

impl ChallengeDeployments {
    pub fn address_for(&self, chain_id: u64) -> Option<Address> {
        match chain_id {
            LOCAL_CHAIN_ID => self.local,
            SEPOLIA_CHAIN_ID => Some(self.sepolia.unwrap_or(SEPOLIA_CHALLENGE_ADDRESS)),
            _ => None,
        }
    }
}

/// A log as returned by a node, with its position in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub block_number: u64,
    pub log_index: u64,
    pub data: LogData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRecord {
    pub challenge_id: U256,
    pub participant: Address,
    pub day_index: U256,
    pub report_cid: String,
    pub block_number: u64,
}

/// The check-ins of `participant` in `challenge_id`, oldest first.
///
/// Logs of other events or that do not decode are skipped.
pub fn check_in_history(
    logs: &[RawLog],
    challenge_id: U256,
    participant: Address,
) -> Vec<CheckInRecord> {
    let mut records: Vec<(u64, CheckInRecord)> = logs
        .iter()
        .filter_map(|log| {
            let event = ChallengeFHE::CheckIn::decode_log_data(&log.data).ok()?;
            (event.challengeId == challenge_id && event.participant == participant).then(|| {
                (
                    log.log_index,
                    CheckInRecord {
                        challenge_id: event.challengeId,
                        participant: event.participant,
                        day_index: event.dayIndex,
                        report_cid: event.reportCID,
                        block_number: log.block_number,
                    },
                )
            })
        })
        .collect();
    records.sort_by_key(|(log_index, record)| (record.block_number, *log_index));
    records.into_iter().map(|(_, record)| record).collect()
}

/// Encrypt the increment of one successful day, for `participant` calling `contract`.
pub async fn encrypt_check_in<E: FhevmEncryptor>(
    encryptor: &E,
    contract: Address,
    participant: Address,
) -> anyhow::Result<EncryptedInput> {
    let mut builder = encryptor.create_encrypted_input(contract, participant);
    builder.add32(1);
    builder.encrypt().await
}

/// Calldata of `checkIn` carrying the first handle of `input`.
pub fn encode_check_in_call(
    challenge_id: U256,
    report_cid: &str,
    input: &EncryptedInput,
) -> anyhow::Result<Bytes> {
    let enc_increment = *input
        .handles
        .first()
        .ok_or_else(|| anyhow_error_and_log("encrypted input carries no handle"))?;
    let call = ChallengeFHE::checkInCall {
        challengeId: challenge_id,
        reportCID: report_cid.to_string(),
        encIncrement: enc_increment,
        inputProof: input.input_proof.clone(),
    };
    Ok(call.abi_encode().into())
}
