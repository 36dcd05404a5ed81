use std::str::FromStr;

use anyhow::Context;
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Column, Row, TypeInfo, ValueRef,
};

use crate::config::Config;
use crate::data::{
    matches, DishDetail, DishList, Filters, Record, RestaurantDetail, RestaurantList,
};

/// Open the store once for the whole process. The service never writes, so
/// the file is opened read-only and must already exist.
pub async fn connect(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .with_context(|| format!("invalid database url {}", config.database_url))?
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("fail to open database {}", config.database_url))?;
    Ok(pool)
}

/// Turn a row into a JSON object, keyed by column name in select order.
fn to_record(row: &SqliteRow) -> anyhow::Result<Record> {
    let mut record = Record::new();
    for column in row.columns() {
        let i = column.ordinal();
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            // sqlite is dynamically typed, so go by the storage class of the
            // value rather than the declared column type
            let class = raw.type_info().name().to_string();
            match class.as_str() {
                "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Value::from(row.try_get_unchecked::<f64, _>(i)?),
                "BLOB" => Value::from(row.try_get_unchecked::<Vec<u8>, _>(i)?),
                _ => Value::from(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

async fn fetch_records(db_conn: &SqlitePool, sql: &str) -> anyhow::Result<Vec<Record>> {
    sqlx::query(sql)
        .fetch_all(db_conn)
        .await?
        .iter()
        .map(to_record)
        .collect()
}

async fn fetch_records_where(
    db_conn: &SqlitePool,
    sql: &str,
    param: &str,
) -> anyhow::Result<Vec<Record>> {
    sqlx::query(sql)
        .bind(param)
        .fetch_all(db_conn)
        .await?
        .iter()
        .map(to_record)
        .collect()
}

async fn fetch_record_where(
    db_conn: &SqlitePool,
    sql: &str,
    param: &str,
) -> anyhow::Result<Option<Record>> {
    sqlx::query(sql)
        .bind(param)
        .fetch_optional(db_conn)
        .await?
        .as_ref()
        .map(to_record)
        .transpose()
}

pub async fn fetch_all_restaurants(db_conn: &SqlitePool) -> anyhow::Result<RestaurantList> {
    let restaurants = fetch_records(db_conn, "SELECT * FROM restaurants")
        .await
        .context("fail to fetch restaurants")?;
    Ok(RestaurantList { restaurants })
}

/// `id` is bound as text; the integer column's affinity does the coercion, so
/// a non-numeric id simply finds nothing.
pub async fn fetch_restaurant_by_id(
    db_conn: &SqlitePool,
    id: &str,
) -> anyhow::Result<RestaurantDetail> {
    let restaurant = fetch_record_where(db_conn, "SELECT * FROM restaurants WHERE id = ?", id)
        .await
        .with_context(|| format!("fail to fetch restaurant {id}"))?;
    Ok(RestaurantDetail { restaurant })
}

pub async fn fetch_restaurants_by_cuisine(
    db_conn: &SqlitePool,
    cuisine: &str,
) -> anyhow::Result<RestaurantList> {
    let restaurants =
        fetch_records_where(db_conn, "SELECT * FROM restaurants WHERE cuisine = ?", cuisine)
            .await
            .with_context(|| format!("fail to fetch {cuisine} restaurants"))?;
    Ok(RestaurantList { restaurants })
}

pub async fn fetch_filtered_restaurants(
    db_conn: &SqlitePool,
    filters: &Filters,
) -> anyhow::Result<RestaurantList> {
    let RestaurantList { restaurants } = fetch_all_restaurants(db_conn).await?;
    let restaurants = restaurants
        .into_iter()
        .filter(|restaurant| matches(restaurant, filters))
        .collect();
    Ok(RestaurantList { restaurants })
}

pub async fn fetch_restaurants_sorted_by_rating(
    db_conn: &SqlitePool,
) -> anyhow::Result<RestaurantList> {
    let restaurants = fetch_records(db_conn, "SELECT * FROM restaurants ORDER BY rating DESC")
        .await
        .context("fail to fetch restaurants by rating")?;
    Ok(RestaurantList { restaurants })
}

pub async fn fetch_all_dishes(db_conn: &SqlitePool) -> anyhow::Result<DishList> {
    let dishes = fetch_records(db_conn, "SELECT * FROM dishes")
        .await
        .context("fail to fetch dishes")?;
    Ok(DishList { dishes })
}

pub async fn fetch_dish_by_id(db_conn: &SqlitePool, id: &str) -> anyhow::Result<DishDetail> {
    let dish = fetch_record_where(db_conn, "SELECT * FROM dishes WHERE id = ?", id)
        .await
        .with_context(|| format!("fail to fetch dish {id}"))?;
    Ok(DishDetail { dish })
}

pub async fn fetch_filtered_dishes(
    db_conn: &SqlitePool,
    filters: &Filters,
) -> anyhow::Result<DishList> {
    let DishList { dishes } = fetch_all_dishes(db_conn).await?;
    let dishes = dishes
        .into_iter()
        .filter(|dish| matches(dish, filters))
        .collect();
    Ok(DishList { dishes })
}

pub async fn fetch_dishes_sorted_by_price(db_conn: &SqlitePool) -> anyhow::Result<DishList> {
    let dishes = fetch_records(db_conn, "SELECT * FROM dishes ORDER BY price")
        .await
        .context("fail to fetch dishes by price")?;
    Ok(DishList { dishes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Executor;

    async fn seeded_pool() -> SqlitePool {
        // one connection, otherwise every connection gets its own empty memory db
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        pool.execute(include_str!("../fixtures/seed.sql"))
            .await
            .unwrap();
        pool
    }

    fn ids(records: &[Record]) -> Vec<i64> {
        records.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    fn filters(pairs: &[(&str, &str)]) -> Filters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_all_restaurants_keeps_store_order() {
        let db = seeded_pool().await;
        let list = fetch_all_restaurants(&db).await.unwrap();
        assert_eq!(ids(&list.restaurants), vec![1, 2, 3, 4]);

        let first = &list.restaurants[0];
        assert_eq!(first["name"], "Trattoria Roma");
        assert_eq!(first["cuisine"], "Italian");
        assert_eq!(first["rating"], 4.5);
        assert_eq!(first["isVeg"], "false");
    }

    #[tokio::test]
    async fn test_fetch_restaurant_by_id() {
        let db = seeded_pool().await;

        let found = fetch_restaurant_by_id(&db, "2").await.unwrap();
        let restaurant = found.restaurant.unwrap();
        assert_eq!(restaurant["id"], 2);
        assert_eq!(restaurant["cuisine"], "Indian");

        assert!(fetch_restaurant_by_id(&db, "99").await.unwrap().restaurant.is_none());
        assert!(fetch_restaurant_by_id(&db, "abc").await.unwrap().restaurant.is_none());
    }

    #[tokio::test]
    async fn test_fetch_restaurants_by_cuisine_is_case_sensitive() {
        let db = seeded_pool().await;
        let list = fetch_restaurants_by_cuisine(&db, "Indian").await.unwrap();
        assert_eq!(ids(&list.restaurants), vec![2, 4]);

        let list = fetch_restaurants_by_cuisine(&db, "indian").await.unwrap();
        assert!(list.restaurants.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_filtered_restaurants() {
        let db = seeded_pool().await;

        let veg = fetch_filtered_restaurants(&db, &filters(&[("isVeg", "true")]))
            .await
            .unwrap();
        assert_eq!(ids(&veg.restaurants), vec![2, 4]);

        let both = fetch_filtered_restaurants(
            &db,
            &filters(&[("isVeg", "true"), ("hasOutdoorSeating", "true")]),
        )
        .await
        .unwrap();
        assert_eq!(ids(&both.restaurants), vec![4]);

        let all = fetch_filtered_restaurants(&db, &Vec::new()).await.unwrap();
        assert_eq!(all.restaurants.len(), 4);

        let unknown = fetch_filtered_restaurants(&db, &filters(&[("hasValet", "true")]))
            .await
            .unwrap();
        assert!(unknown.restaurants.is_empty());
    }

    #[tokio::test]
    async fn test_sort_by_rating_is_non_increasing() {
        let db = seeded_pool().await;
        let list = fetch_restaurants_sorted_by_rating(&db).await.unwrap();
        let ratings: Vec<f64> = list
            .restaurants
            .iter()
            .map(|r| r["rating"].as_f64().unwrap())
            .collect();
        assert_eq!(ratings.len(), 4);
        assert!(ratings.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(list.restaurants[0]["id"], 2);
    }

    #[tokio::test]
    async fn test_dishes() {
        let db = seeded_pool().await;

        let all = fetch_all_dishes(&db).await.unwrap();
        assert_eq!(ids(&all.dishes), vec![1, 2, 3]);

        let dish = fetch_dish_by_id(&db, "3").await.unwrap().dish.unwrap();
        assert_eq!(dish["name"], "Masala Dosa");
        assert!(fetch_dish_by_id(&db, "7").await.unwrap().dish.is_none());

        let veg = fetch_filtered_dishes(&db, &filters(&[("isVeg", "true")]))
            .await
            .unwrap();
        assert_eq!(ids(&veg.dishes), vec![1, 3]);

        let sorted = fetch_dishes_sorted_by_price(&db).await.unwrap();
        let prices: Vec<f64> = sorted
            .dishes
            .iter()
            .map(|d| d["price"].as_f64().unwrap())
            .collect();
        assert!(prices.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ids(&sorted.dishes), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_null_column_is_json_null() {
        let db = seeded_pool().await;
        let dish = fetch_dish_by_id(&db, "2").await.unwrap().dish.unwrap();
        assert_eq!(dish["description"], Value::Null);
    }

    #[tokio::test]
    async fn test_missing_table_is_an_error() {
        let db = seeded_pool().await;
        db.execute("DROP TABLE dishes").await.unwrap();
        let err = fetch_all_dishes(&db).await.unwrap_err();
        assert!(format!("{err:#}").starts_with("fail to fetch dishes"));
    }

    #[tokio::test]
    async fn test_connect_refuses_missing_file() {
        let config = crate::config::ConfigBuilder::default()
            .database_url("sqlite:/nonexistent/dir/food.sqlite")
            .build()
            .unwrap();
        assert!(connect(&config).await.is_err());
    }
}
