//! Search, category filter, sort and pagination over fetched listings

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;

use super::decode::Listing;

pub const DEFAULT_PAGE_SIZE: usize = 12;

/// Case-insensitive substring match on title, description or category.
/// A blank query keeps everything.
pub fn search(listings: &[Listing], query: &str) -> Vec<Listing> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return listings.to_vec();
    }
    listings
        .iter()
        .filter(|l| {
            l.title.to_lowercase().contains(&needle)
                || l.description.to_lowercase().contains(&needle)
                || l.category.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

/// Case-insensitive exact match on category.
pub fn filter_category(listings: Vec<Listing>, category: &str) -> Vec<Listing> {
    let wanted = category.trim().to_lowercase();
    listings
        .into_iter()
        .filter(|l| l.category.to_lowercase() == wanted)
        .collect()
}

/// Listings published by one creator.
pub fn filter_creator(listings: Vec<Listing>, creator_id: i64) -> Vec<Listing> {
    listings
        .into_iter()
        .filter(|l| l.creator_id == Some(creator_id))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Title,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "price-asc" | "price_asc" => Ok(Self::PriceAsc),
            "price-desc" | "price_desc" => Ok(Self::PriceDesc),
            "title" => Ok(Self::Title),
            other => Err(format!("Unknown sort order: {}", other)),
        }
    }
}

fn created_at(listing: &Listing) -> Option<DateTime<Utc>> {
    listing
        .created_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
}

/// Sort in place. Newest compares parsed `createdAt` timestamps, with
/// missing or unparseable ones last, then the higher id. Ties keep their
/// order.
pub fn sort(listings: &mut [Listing], order: SortOrder) {
    match order {
        SortOrder::Newest => listings.sort_by(|a, b| {
            created_at(b)
                .cmp(&created_at(a))
                .then_with(|| b.id.cmp(&a.id))
        }),
        SortOrder::PriceAsc => listings.sort_by_key(|l| l.price),
        SortOrder::PriceDesc => listings.sort_by(|a, b| b.price.cmp(&a.price)),
        SortOrder::Title => listings.sort_by_key(|l| l.title.to_lowercase()),
    }
}

/// One page of listings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<Listing>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

/// 1-indexed pagination. Page 0 is treated as 1; a page size of 0 uses the
/// default.
pub fn paginate(listings: &[Listing], page: usize, page_size: usize) -> Page {
    let page = page.max(1);
    let page_size = if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size };
    let total = listings.len();
    let total_pages = total.div_ceil(page_size);

    let items = listings
        .iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .cloned()
        .collect();

    Page {
        items,
        total,
        page,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fallback::placeholder_listings;

    fn listing(id: i64, title: &str, category: &str, price: u64, created_at: &str) -> Listing {
        Listing {
            id,
            title: title.to_string(),
            description: format!("{} description", title),
            creator_name: "maker".to_string(),
            category: category.to_string(),
            price,
            direct_print_enabled: false,
            creator_id: Some(id % 2),
            thumbnail_url: None,
            model_url: None,
            status: None,
            created_at: Some(created_at.to_string()),
        }
    }

    #[test]
    fn test_search_matches_title_description_category() {
        let all = placeholder_listings();
        assert_eq!(search(&all, "DRAGON").len(), 1);
        assert_eq!(search(&all, "geometric patterns").len(), 1);
        assert_eq!(search(&all, "mechanical").len(), 1);
        assert_eq!(search(&all, "  ").len(), 4);
        assert!(search(&all, "spaceship").is_empty());
    }

    #[test]
    fn test_filter_category_case_insensitive_exact() {
        let mut all = placeholder_listings();
        all.push(listing(9, "Board", "gaming", 100, "2024-01-01T00:00:00Z"));
        all.push(listing(10, "Dice tower", "Gaming Accessories", 100, "2024-01-01T00:00:00Z"));

        let gaming = filter_category(all, "Gaming");
        let ids: Vec<_> = gaming.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![2, 9]);
    }

    #[test]
    fn test_sort_orders() {
        let mut items = vec![
            listing(1, "beta", "Art", 300, "2024-01-01T00:00:00Z"),
            listing(2, "Alpha", "Art", 100, "2024-03-01T00:00:00Z"),
            listing(3, "gamma", "Art", 200, "2024-02-01T00:00:00Z"),
        ];

        sort(&mut items, SortOrder::Newest);
        assert_eq!(items.iter().map(|l| l.id).collect::<Vec<_>>(), vec![2, 3, 1]);
        sort(&mut items, SortOrder::PriceAsc);
        assert_eq!(items.iter().map(|l| l.id).collect::<Vec<_>>(), vec![2, 3, 1]);
        sort(&mut items, SortOrder::PriceDesc);
        assert_eq!(items.iter().map(|l| l.id).collect::<Vec<_>>(), vec![1, 3, 2]);
        sort(&mut items, SortOrder::Title);
        assert_eq!(items.iter().map(|l| l.id).collect::<Vec<_>>(), vec![2, 1, 3]);
    }

    #[test]
    fn test_newest_compares_timestamps_not_text() {
        let mut items = vec![
            listing(1, "whole", "Art", 1, "2024-05-01T10:00:05Z"),
            listing(2, "fraction", "Art", 1, "2024-05-01T10:00:05.500Z"),
            listing(3, "offset", "Art", 1, "2024-05-01T12:00:06+02:00"),
        ];
        items.push(Listing {
            created_at: None,
            ..listing(4, "undated", "Art", 1, "")
        });

        sort(&mut items, SortOrder::Newest);
        assert_eq!(items.iter().map(|l| l.id).collect::<Vec<_>>(), vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_filter_creator() {
        let mine = filter_creator(placeholder_listings(), 2);
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "Dragon Miniature");

        let items: Vec<Listing> = (1..=5)
            .map(|i| listing(i, "x", "Art", 1, "2024-01-01T00:00:00Z"))
            .collect();
        let odd = filter_creator(items, 1);
        assert_eq!(odd.iter().map(|l| l.id).collect::<Vec<_>>(), vec![1, 3, 5]);
        assert!(filter_creator(placeholder_listings(), 99).is_empty());
    }

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!("price-asc".parse::<SortOrder>(), Ok(SortOrder::PriceAsc));
        assert_eq!("Title".parse::<SortOrder>(), Ok(SortOrder::Title));
        assert!("cheapest".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_paginate() {
        let items: Vec<Listing> = (1..=25)
            .map(|i| listing(i, "x", "Art", 1, "2024-01-01T00:00:00Z"))
            .collect();

        let first = paginate(&items, 1, DEFAULT_PAGE_SIZE);
        assert_eq!(first.items.len(), 12);
        assert_eq!(first.total, 25);
        assert_eq!(first.total_pages, 3);

        let last = paginate(&items, 3, 12);
        assert_eq!(last.items.iter().map(|l| l.id).collect::<Vec<_>>(), vec![25]);

        assert!(paginate(&items, 9, 12).items.is_empty());
        assert_eq!(paginate(&items, 0, 0).page, 1);
        assert_eq!(paginate(&[], 1, 12).total_pages, 0);
    }
}
