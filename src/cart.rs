//! The customer's cart. It lives only as long as the session and is emptied on logout.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Specification {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
}

/// A dish as listed by the backend, with the specification the customer picked.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub selected_specification: Option<Specification>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: i64,
    pub name: String,
    /// Unit price of the chosen specification, or of the dish without one.
    pub price: Decimal,
    pub image: Option<String>,
    pub specification_id: Option<i64>,
    pub specification_name: Option<String>,
    pub quantity: u32,
}

impl CartLine {
    fn matches(&self, dish_id: i64, specification_id: Option<i64>) -> bool {
        self.id == dish_id && self.specification_id == specification_id
    }

    pub fn amount(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` of the dish; a line for the same dish and specification grows instead.
    pub fn add(&mut self, dish: &Dish, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let spec = dish.selected_specification.as_ref();
        let specification_id = spec.map(|s| s.id);
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|line| line.matches(dish.id, specification_id))
        {
            line.quantity = line.quantity.saturating_add(quantity);
            debug!(dish = dish.id, quantity = line.quantity, "cart line grown");
            return;
        }
        self.lines.push(CartLine {
            id: dish.id,
            name: dish.name.clone(),
            price: spec.map_or(dish.price, |s| s.price),
            image: dish.image.clone(),
            specification_id,
            specification_name: spec.map(|s| s.name.clone()),
            quantity,
        });
        debug!(dish = dish.id, "cart line added");
    }

    pub fn remove(&mut self, dish_id: i64, specification_id: Option<i64>) -> Option<CartLine> {
        let index = self
            .lines
            .iter()
            .position(|line| line.matches(dish_id, specification_id))?;
        Some(self.lines.remove(index))
    }

    /// Sets the quantity of an existing line. Zero or less removes it.
    pub fn update_quantity(&mut self, dish_id: i64, specification_id: Option<i64>, quantity: i64) {
        if quantity <= 0 {
            self.remove(dish_id, specification_id);
            return;
        }
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|line| line.matches(dish_id, specification_id))
        {
            line.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    pub fn total_amount(&self) -> Decimal {
        self.lines.iter().map(CartLine::amount).sum()
    }
}
