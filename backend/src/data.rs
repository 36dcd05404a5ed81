use serde::Serialize;
use serde_json::{Map, Value};

/// One store row, column name to value, in column order.
pub type Record = Map<String, Value>;

/// Field name to expected value. Every entry must match for a record to be kept.
pub type Filters = Vec<(String, String)>;

#[derive(Debug, Serialize)]
pub struct RestaurantList {
    pub restaurants: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct RestaurantDetail {
    pub restaurant: Option<Record>,
}

#[derive(Debug, Serialize)]
pub struct DishList {
    pub dishes: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct DishDetail {
    pub dish: Option<Record>,
}

/// Lets the api layer answer 404 without caring which envelope it holds.
pub trait Envelope: Serialize {
    fn is_empty(&self) -> bool;
}

impl Envelope for RestaurantList {
    fn is_empty(&self) -> bool {
        self.restaurants.is_empty()
    }
}

impl Envelope for RestaurantDetail {
    fn is_empty(&self) -> bool {
        self.restaurant.is_none()
    }
}

impl Envelope for DishList {
    fn is_empty(&self) -> bool {
        self.dishes.is_empty()
    }
}

impl Envelope for DishDetail {
    fn is_empty(&self) -> bool {
        self.dish.is_none()
    }
}

/// Text form of a field used for filter comparison: strings as is, integers in
/// decimal, reals through `f64`'s `Display` (so `4.0` is `"4"`, and very large
/// or small reals are written out in full rather than in exponent form).
/// `None` means the value can never equal a filter string (null, arrays,
/// objects).
pub fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                // f64's Display already drops a zero fraction: 4.0 -> "4"
                n.as_f64().map(|f| f.to_string())
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// A record matches when every filter key names one of its fields and that
/// field's text form equals the expected value.
pub fn matches(record: &Record, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(key, expected)| {
        record
            .get(key)
            .and_then(stringify)
            .map_or(false, |actual| &actual == expected)
    })
}
