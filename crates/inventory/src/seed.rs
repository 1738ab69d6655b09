//! Demo product catalogue.

use common::Money;
use tracing::info;

use crate::repository::InventoryRepository;
use crate::{Product, Result};

/// Name of the catalogue entry stocked with only five units.
pub const LIMITED_STOCK_ITEM: &str = "Limited Stock Item";

/// The demo catalogue, with fresh product ids.
pub fn catalogue() -> Vec<Product> {
    [
        ("Laptop - Dell XPS 15", "High-performance laptop with 15-inch display", 50, 129999),
        ("Wireless Mouse", "Ergonomic wireless mouse with precision tracking", 200, 2999),
        ("Mechanical Keyboard", "RGB mechanical keyboard with Cherry MX switches", 100, 8999),
        ("USB-C Hub", "7-in-1 USB-C hub with HDMI and Ethernet", 150, 4999),
        ("Webcam HD", "1080p webcam with auto-focus and noise cancellation", 75, 7999),
        ("Headphones - Noise Cancelling", "Premium noise-cancelling headphones with 30h battery", 60, 24999),
        ("Monitor 27\"", "4K UHD monitor with IPS panel and HDR", 40, 39999),
        ("External SSD 1TB", "Portable SSD with USB 3.2 Gen 2 interface", 120, 12999),
        ("Desk Lamp LED", "Adjustable LED desk lamp with touch controls", 90, 3999),
        (LIMITED_STOCK_ITEM, "Product with only 5 units available", 5, 1999),
    ]
    .into_iter()
    .map(|(name, description, stock, cents)| {
        Product::new(name, stock, Money::from_cents(cents)).with_description(description)
    })
    .collect()
}

/// Loads the demo catalogue into a repository and returns the stored products.
pub async fn seed(repository: &dyn InventoryRepository) -> Result<Vec<Product>> {
    let products = catalogue();
    for product in &products {
        repository.upsert_product(product.clone()).await?;
        info!(product_id = %product.id, name = %product.name, stock = product.stock_quantity, "Seeded product");
    }
    Ok(products)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_has_limited_item() {
        let products = catalogue();
        assert_eq!(products.len(), 10);
        let limited = products
            .iter()
            .find(|p| p.name == LIMITED_STOCK_ITEM)
            .unwrap();
        assert_eq!(limited.stock_quantity, 5);
        assert_eq!(limited.price, Money::from_cents(1999));
    }
}
