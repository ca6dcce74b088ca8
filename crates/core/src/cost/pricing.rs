//! Worker pricing tables.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::error::CostError;

/// Disk below this size is included in the compute price.
const FREE_DISK_MB: u32 = 512;

/// Per-region unit prices in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionPrice {
    /// Price per GB-second of memory.
    pub gb_second: f64,
    /// Price per invocation.
    pub request: f64,
    /// Price per GB-second of billable ephemeral disk.
    pub storage_gb_second: f64,
}

/// Read-only price lookup.
pub trait PricingTable: Send + Sync {
    /// Compute and disk price of `duration_ms` of billed time.
    fn lookup(
        &self,
        region: &str,
        memory_mb: u32,
        duration_ms: u64,
        disk_mb: u32,
    ) -> Result<f64, CostError>;

    /// Price of a single invocation.
    fn request_price(&self, region: &str) -> Result<f64, CostError>;

    /// Currency of every amount returned.
    fn currency(&self) -> &str {
        "USD"
    }
}

static LAMBDA_PRICES: Lazy<HashMap<&'static str, RegionPrice>> = Lazy::new(|| {
    let standard = RegionPrice {
        gb_second: 0.000_013_333_4,
        request: 0.000_000_2,
        storage_gb_second: 0.000_000_030_9,
    };
    let mut prices = HashMap::new();
    for region in [
        "us-east-1",
        "us-east-2",
        "us-west-1",
        "us-west-2",
        "ca-central-1",
        "eu-central-1",
        "eu-west-1",
        "eu-west-2",
        "eu-west-3",
        "eu-north-1",
        "ap-northeast-1",
        "ap-northeast-2",
        "ap-northeast-3",
        "ap-south-1",
        "ap-southeast-1",
        "ap-southeast-2",
        "sa-east-1",
    ] {
        prices.insert(region, standard);
    }
    prices.insert(
        "af-south-1",
        RegionPrice {
            gb_second: 0.000_017_5,
            request: 0.000_000_27,
            storage_gb_second: 0.000_000_037,
        },
    );
    prices.insert(
        "ap-east-1",
        RegionPrice {
            gb_second: 0.000_018_3,
            request: 0.000_000_25,
            storage_gb_second: 0.000_000_037,
        },
    );
    prices.insert(
        "eu-south-1",
        RegionPrice {
            gb_second: 0.000_015_5,
            request: 0.000_000_23,
            storage_gb_second: 0.000_000_035,
        },
    );
    prices.insert(
        "me-south-1",
        RegionPrice {
            gb_second: 0.000_016_2,
            request: 0.000_000_25,
            storage_gb_second: 0.000_000_036,
        },
    );
    prices
});

/// Built-in serverless function price list.
#[derive(Debug, Clone, Copy, Default)]
pub struct LambdaPricing;

impl LambdaPricing {
    pub fn new() -> Self {
        Self
    }

    /// Whether the region has a price.
    pub fn supports_region(region: &str) -> bool {
        LAMBDA_PRICES.contains_key(region)
    }

    /// All regions with a price, sorted.
    pub fn regions() -> Vec<&'static str> {
        let mut regions: Vec<_> = LAMBDA_PRICES.keys().copied().collect();
        regions.sort_unstable();
        regions
    }

    fn price(region: &str) -> Result<&'static RegionPrice, CostError> {
        LAMBDA_PRICES
            .get(region)
            .ok_or_else(|| CostError::UnknownRegion {
                region: region.to_string(),
            })
    }
}

impl PricingTable for LambdaPricing {
    fn lookup(
        &self,
        region: &str,
        memory_mb: u32,
        duration_ms: u64,
        disk_mb: u32,
    ) -> Result<f64, CostError> {
        if !(128..=10240).contains(&memory_mb) {
            return Err(CostError::InvalidMemory { memory_mb });
        }
        if !(512..=10240).contains(&disk_mb) {
            return Err(CostError::InvalidDisk { disk_mb });
        }
        let price = Self::price(region)?;

        let seconds = duration_ms as f64 / 1000.0;
        let memory = memory_mb as f64 / 1024.0 * seconds * price.gb_second;
        let disk =
            (disk_mb - FREE_DISK_MB) as f64 / 1024.0 * seconds * price.storage_gb_second;
        Ok(memory + disk)
    }

    fn request_price(&self, region: &str) -> Result<f64, CostError> {
        Ok(Self::price(region)?.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_scales_with_memory_and_duration() {
        let pricing = LambdaPricing::new();
        let base = pricing.lookup("us-east-1", 1024, 1000, 512).unwrap();
        assert!((base - 0.000_013_333_4).abs() < 1e-12);

        let double_memory = pricing.lookup("us-east-1", 2048, 1000, 512).unwrap();
        assert!((double_memory - 2.0 * base).abs() < 1e-12);

        let with_disk = pricing.lookup("us-east-1", 1024, 1000, 10240).unwrap();
        assert!(with_disk > base);
    }

    #[test]
    fn test_unknown_region() {
        let pricing = LambdaPricing::new();
        assert_eq!(
            pricing.request_price("mars-north-1"),
            Err(CostError::UnknownRegion {
                region: "mars-north-1".to_string()
            })
        );
        assert!(!LambdaPricing::supports_region("mars-north-1"));
        assert!(LambdaPricing::regions().contains(&"eu-central-1"));
    }

    #[test]
    fn test_out_of_range_sizes() {
        let pricing = LambdaPricing::new();
        assert!(matches!(
            pricing.lookup("us-east-1", 64, 1000, 512),
            Err(CostError::InvalidMemory { .. })
        ));
        assert!(matches!(
            pricing.lookup("us-east-1", 1024, 1000, 100),
            Err(CostError::InvalidDisk { .. })
        ));
    }
}
