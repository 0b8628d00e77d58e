//! Completeness checks run before an order leaves the system.

use rust_decimal::Decimal;
use sync_types::OrderAggregate;

fn is_blank(value: &str) -> bool {
	value.trim().is_empty()
}

/// Returns every problem found with `order`; an empty list means valid.
pub fn validate_order(order: &OrderAggregate) -> Vec<String> {
	let mut errors = Vec::new();
	let header = &order.header;

	let required = [
		("orderNo", &header.order_no),
		("shipName", &header.ship_name),
		("shipAddress1", &header.ship_address1),
		("shipCity", &header.ship_city),
		("shipZipCode", &header.ship_zip_code),
	];
	for (name, value) in required {
		if is_blank(value) {
			errors.push(format!("{name} is missing or empty"));
		}
	}

	if order.lines.is_empty() {
		errors.push("Order has no line items".to_string());
	}

	for (i, line) in order.lines.iter().enumerate() {
		if is_blank(&line.sku) {
			errors.push(format!("orderLine[{i}]: sku is missing or empty"));
		}
		if line.qty <= 0 {
			errors.push(format!("orderLine[{i}]: qty must be > 0 (got {})", line.qty));
		}
		if line.item_price <= Decimal::ZERO {
			errors.push(format!(
				"orderLine[{i}]: itemPrice must be > 0 (got {})",
				line.item_price
			));
		}
	}

	errors
}

#[cfg(test)]
mod tests {
	use super::*;
	use sync_types::{LineItem, SourceRecord};

	fn valid_order() -> OrderAggregate {
		let mut record = SourceRecord::new("r1", "ORD-1");
		record.ship_name = "Taro".into();
		record.ship_address1 = "1-2-3".into();
		record.ship_city = "Tokyo".into();
		record.ship_zip_code = "100-0001".into();
		let mut order = OrderAggregate::from_first_record(&record);
		order.lines.push(LineItem {
			sku: "SKU".into(),
			qty: 1,
			line_no: 1,
			item_price: Decimal::new(100, 0),
		});
		order
	}

	#[test]
	fn test_valid_order_has_no_errors() {
		assert!(validate_order(&valid_order()).is_empty());
	}

	#[test]
	fn test_blank_header_fields_are_reported() {
		let mut order = valid_order();
		order.header.ship_name = "   ".into();
		order.header.ship_zip_code = String::new();

		assert_eq!(
			validate_order(&order),
			vec![
				"shipName is missing or empty".to_string(),
				"shipZipCode is missing or empty".to_string(),
			]
		);
	}

	#[test]
	fn test_no_lines() {
		let mut order = valid_order();
		order.lines.clear();
		assert_eq!(validate_order(&order), vec!["Order has no line items".to_string()]);
	}

	#[test]
	fn test_line_errors_are_all_collected() {
		let mut order = valid_order();
		order.lines.push(LineItem {
			sku: "".into(),
			qty: 0,
			line_no: 2,
			item_price: Decimal::new(-5, 1),
		});

		let errors = validate_order(&order);
		assert_eq!(
			errors,
			vec![
				"orderLine[1]: sku is missing or empty".to_string(),
				"orderLine[1]: qty must be > 0 (got 0)".to_string(),
				"orderLine[1]: itemPrice must be > 0 (got -0.5)".to_string(),
			]
		);
	}

	#[test]
	fn test_zero_price_is_rejected() {
		let mut order = valid_order();
		order.lines[0].item_price = Decimal::ZERO;
		let errors = validate_order(&order);
		assert_eq!(errors, vec!["orderLine[0]: itemPrice must be > 0 (got 0)".to_string()]);
	}
}
