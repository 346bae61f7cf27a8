use super::returns::AssetAssumptions;
use super::types::GlidePath;

impl GlidePath {
    pub fn stock_allocation(&self, years_since_retirement: f64) -> f64 {
        if !self.enabled {
            return 1.0;
        }

        let start = self.start_stock_allocation.clamp(0.0, 1.0);
        let end = self.end_stock_allocation.clamp(0.0, 1.0);
        if years_since_retirement < 0.0 {
            return start;
        }
        if self.glide_years <= 0.0 || years_since_retirement >= self.glide_years {
            return end;
        }

        let progress = years_since_retirement / self.glide_years;
        (start + (end - start) * progress).clamp(0.0, 1.0)
    }

    pub fn accumulation_allocation(&self, months_to_retirement: u32) -> f64 {
        if !self.enabled || (months_to_retirement as f64) > self.lead_years * 12.0 {
            return 1.0;
        }
        self.stock_allocation(-(months_to_retirement as f64) / 12.0 - f64::EPSILON)
    }
}

pub fn blended_mean(stock_fraction: f64, stock: AssetAssumptions, bond: AssetAssumptions) -> f64 {
    let f = stock_fraction.clamp(0.0, 1.0);
    f * stock.mean + (1.0 - f) * bond.mean
}
