use std::fmt::{Display, Formatter};

use ethers::utils::{format_units, parse_units, ConversionError};

use crate::U256;

/// ERC-20 default, used when no token contract is configured
pub const DEFAULT_DECIMALS: u32 = 18;

/// Raw on-chain token amount together with the token's declared decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: u32,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u32) -> Self {
        Self { raw, decimals }
    }

    /// Parse a human readable amount, e.g. `"100"` or `"0.5"`
    pub fn parse(amount: &str, decimals: u32) -> Result<Self, ConversionError> {
        let raw = parse_units(amount, decimals)?.into();
        Ok(Self { raw, decimals })
    }

    /// `raw / 10^decimals` rendered as a decimal string
    pub fn scaled(&self) -> String {
        format_units(self.raw, self.decimals).unwrap_or_else(|_| self.raw.to_string())
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.scaled())
    }
}

impl From<TokenAmount> for U256 {
    fn from(amount: TokenAmount) -> Self {
        amount.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling() {
        let amount = TokenAmount::new(U256::exp10(20), 18);
        assert_eq!(amount.to_string(), "100.000000000000000000");

        let amount = TokenAmount::new(U256::from(1_500_000), 6);
        assert_eq!(amount.to_string(), "1.500000");
    }

    #[test]
    fn test_parse() {
        let amount = TokenAmount::parse("200", 18).unwrap();
        assert_eq!(amount.raw, U256::from(200) * U256::exp10(18));
        assert_eq!(U256::from(amount), amount.raw);

        let amount = TokenAmount::parse("0.5", 6).unwrap();
        assert_eq!(amount.raw, U256::from(500_000));
    }
}
