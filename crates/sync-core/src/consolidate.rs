//! Grouping of line-item records into orders.

use std::collections::HashMap;
use sync_types::{LineItem, OrderAggregate, SourceRecord};

/// Orders built in one pass, in the order their numbers were first seen.
#[derive(Debug, Default)]
pub struct OrderBook {
	orders: Vec<OrderAggregate>,
	index: HashMap<String, usize>,
	/// Distinct order numbers left out because the cap was reached.
	excluded: Vec<String>,
}

impl OrderBook {
	pub fn len(&self) -> usize {
		self.orders.len()
	}

	pub fn is_empty(&self) -> bool {
		self.orders.is_empty()
	}

	pub fn get(&self, order_no: &str) -> Option<&OrderAggregate> {
		self.index.get(order_no).map(|&i| &self.orders[i])
	}

	pub fn iter(&self) -> impl Iterator<Item = &OrderAggregate> {
		self.orders.iter()
	}

	pub fn excluded(&self) -> &[String] {
		&self.excluded
	}
}

impl IntoIterator for OrderBook {
	type Item = OrderAggregate;
	type IntoIter = std::vec::IntoIter<OrderAggregate>;

	fn into_iter(self) -> Self::IntoIter {
		self.orders.into_iter()
	}
}

/// Groups records by order number, keeping at most `cap` orders.
///
/// The first record seen for an order supplies its header. Lines keep
/// record order; a record without a line number gets the next number in its
/// order. Records without an order number are dropped.
pub fn consolidate<'a, I>(records: I, cap: usize) -> OrderBook
where
	I: IntoIterator<Item = &'a SourceRecord>,
{
	let mut book = OrderBook::default();

	for record in records {
		let order_no = record.order_no.as_str();
		if order_no.is_empty() {
			continue;
		}

		let position = match book.index.get(order_no) {
			Some(&position) => position,
			None if book.orders.len() < cap => {
				book.orders.push(OrderAggregate::from_first_record(record));
				book.index.insert(order_no.to_string(), book.orders.len() - 1);
				book.orders.len() - 1
			},
			None => {
				if !book.excluded.iter().any(|o| o == order_no) {
					book.excluded.push(order_no.to_string());
				}
				continue;
			},
		};

		let order = &mut book.orders[position];
		let next_line = order.lines.len() as u32 + 1;
		order.lines.push(LineItem {
			sku: record.sku.clone(),
			qty: record.qty,
			line_no: record.line_no.filter(|n| *n > 0).unwrap_or(next_line),
			item_price: record.item_price,
		});
		order.rows.push(record.row_ref());
	}

	book
}
