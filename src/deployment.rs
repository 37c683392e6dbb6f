use alloy::json_abi::{Event, JsonAbi};
use alloy::primitives::{Address, B256};
use serde::Deserialize;

use crate::listener::decoder::DepositLayout;

/// Output of the contract deployment step, read once at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct DeploymentRecord {
    #[serde(alias = "contractAddress")]
    pub address: Address,
    #[serde(alias = "interfaceDescription")]
    pub abi: JsonAbi,
}

/// The deposit event as described by the deployed contract's ABI.
#[derive(Debug, Clone)]
pub struct DepositEventSpec {
    pub contract: Address,
    pub signature: String,
    pub topic0: B256,
    pub layout: DepositLayout,
}

impl DeploymentRecord {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            eyre::eyre!(
                "Failed to read deployment record '{}' (deploy the contract first): {}",
                path,
                e
            )
        })?;
        Self::parse(&content).map_err(|e| eyre::eyre!("Invalid deployment record '{}': {}", path, e))
    }

    pub fn parse(content: &str) -> eyre::Result<Self> {
        let record: DeploymentRecord = serde_json::from_str(content)?;
        if record.address == Address::ZERO {
            return Err(eyre::eyre!("contract address is the zero address"));
        }
        Ok(record)
    }

    /// Resolve the deposit event by name. The event must carry exactly one
    /// address input (the sender) and one uint256 input (the amount).
    pub fn deposit_event(&self, event_name: &str) -> eyre::Result<DepositEventSpec> {
        let event = self
            .abi
            .events
            .get(event_name)
            .and_then(|overloads| overloads.iter().find(|e| is_deposit_shape(e)))
            .ok_or_else(|| {
                eyre::eyre!(
                    "Event '{}(address,uint256)' not found in the contract interface",
                    event_name
                )
            })?;

        let sender_indexed = event.inputs[0].indexed;
        let amount_indexed = event.inputs[1].indexed;

        Ok(DepositEventSpec {
            contract: self.address,
            signature: event.signature(),
            topic0: event.selector(),
            layout: DepositLayout {
                sender_indexed,
                amount_indexed,
            },
        })
    }
}

fn is_deposit_shape(event: &Event) -> bool {
    !event.anonymous
        && event.inputs.len() == 2
        && event.inputs[0].ty == "address"
        && event.inputs[1].ty == "uint256"
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;

    const RECORD: &str = r#"{
        "address": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        "abi": [
            {
                "anonymous": false,
                "inputs": [
                    {"indexed": true, "internalType": "address", "name": "from", "type": "address"},
                    {"indexed": false, "internalType": "uint256", "name": "amount", "type": "uint256"}
                ],
                "name": "ETHReceived",
                "type": "event"
            },
            {"stateMutability": "payable", "type": "receive"}
        ]
    }"#;

    #[test]
    fn test_parse_record_and_resolve_event() {
        let record = DeploymentRecord::parse(RECORD).unwrap();
        let spec = record.deposit_event("ETHReceived").unwrap();
        assert_eq!(spec.signature, "ETHReceived(address,uint256)");
        assert_eq!(spec.topic0, keccak256("ETHReceived(address,uint256)"));
        assert!(spec.layout.sender_indexed);
        assert!(!spec.layout.amount_indexed);
        assert_eq!(spec.contract, record.address);
    }

    #[test]
    fn test_accepts_alternate_key_names() {
        let content = RECORD
            .replace("\"address\": \"0x5F", "\"contractAddress\": \"0x5F")
            .replace("\"abi\":", "\"interfaceDescription\":");
        let record = DeploymentRecord::parse(&content).unwrap();
        assert!(record.deposit_event("ETHReceived").is_ok());
    }

    #[test]
    fn test_missing_event_is_an_error() {
        let record = DeploymentRecord::parse(RECORD).unwrap();
        assert!(record.deposit_event("Deposit").is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = DeploymentRecord::load("/nonexistent/deployedContract.json").unwrap_err();
        assert!(err.to_string().contains("deploy the contract first"));
    }

    #[test]
    fn test_zero_address_rejected() {
        let content = RECORD.replace(
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
            "0x0000000000000000000000000000000000000000",
        );
        assert!(DeploymentRecord::parse(&content).is_err());
    }
}
