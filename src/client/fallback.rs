//! Placeholder catalog shown when nothing better is available

use super::decode::Listing;

struct Placeholder {
    id: i64,
    title: &'static str,
    description: &'static str,
    price: u64,
    seed: &'static str,
    model_path: &'static str,
    creator_id: i64,
    creator_name: &'static str,
    category: &'static str,
}

const PLACEHOLDERS: [Placeholder; 4] = [
    Placeholder {
        id: 1,
        title: "Geometric Desk Organizer",
        description: "A modern desk organizer with geometric patterns perfect for any workspace.",
        price: 1499,
        seed: "model1",
        model_path: "/models/desk-organizer.glb",
        creator_id: 1,
        creator_name: "DesignMaster",
        category: "Utility",
    },
    Placeholder {
        id: 2,
        title: "Dragon Miniature",
        description: "Highly detailed dragon miniature perfect for gaming and display.",
        price: 2499,
        seed: "model2",
        model_path: "/models/dragon.glb",
        creator_id: 2,
        creator_name: "GameArtist",
        category: "Gaming",
    },
    Placeholder {
        id: 3,
        title: "Mechanical Keyboard Case",
        description: "Custom mechanical keyboard case with modern aesthetics.",
        price: 3999,
        seed: "model3",
        model_path: "/models/keyboard-case.glb",
        creator_id: 3,
        creator_name: "TechMaker",
        category: "Mechanical",
    },
    Placeholder {
        id: 4,
        title: "Abstract Vase",
        description: "Beautiful abstract vase with unique patterns.",
        price: 1999,
        seed: "model4",
        model_path: "/models/vase.glb",
        creator_id: 4,
        creator_name: "ArtisticSoul",
        category: "Art",
    },
];

/// The static placeholder dataset, one listing per seeded category.
pub fn placeholder_listings() -> Vec<Listing> {
    PLACEHOLDERS
        .iter()
        .map(|p| Listing {
            id: p.id,
            title: p.title.to_string(),
            description: p.description.to_string(),
            creator_name: p.creator_name.to_string(),
            category: p.category.to_string(),
            price: p.price,
            direct_print_enabled: true,
            creator_id: Some(p.creator_id),
            thumbnail_url: Some(format!("https://picsum.photos/seed/{}/400", p.seed)),
            model_url: Some(p.model_path.to_string()),
            status: Some("active".to_string()),
            created_at: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::decode::is_valid_url;

    #[test]
    fn test_placeholders_are_valid_listings() {
        let listings = placeholder_listings();
        assert_eq!(listings.len(), 4);
        for listing in &listings {
            assert!(is_valid_url(listing.thumbnail_url.as_deref().unwrap()));
            assert!(is_valid_url(listing.model_url.as_deref().unwrap()));
            assert!(listing.direct_print_enabled);
        }
        let categories: Vec<_> = listings.iter().map(|l| l.category.as_str()).collect();
        assert_eq!(categories, vec!["Utility", "Gaming", "Mechanical", "Art"]);
    }
}
