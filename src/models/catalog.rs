use super::{ItemId, RecommendationItem};

/// A title the backends can recommend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
    pub id: ItemId,
    pub title: &'static str,
    /// Pipe-separated genre list (e.g. "Comedy|Drama")
    pub genres: &'static str,
    /// Average community rating, used as the item prior
    pub average_rating: f64,
}

impl CatalogEntry {
    pub fn genres(&self) -> impl Iterator<Item = &'static str> {
        self.genres.split('|').filter(|g| !g.is_empty())
    }

    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres().any(|g| g == genre)
    }
}

/// Every genre tag used in the catalog, in a fixed order
pub const GENRES: [&str; 16] = [
    "Action",
    "Adventure",
    "Animation",
    "Children",
    "Comedy",
    "Crime",
    "Drama",
    "Fantasy",
    "Horror",
    "IMAX",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Thriller",
    "War",
    "Western",
];

pub const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { id: 1, title: "Toy Story", genres: "Animation|Children|Comedy", average_rating: 4.1 },
    CatalogEntry { id: 2, title: "Jumanji", genres: "Adventure|Children|Fantasy", average_rating: 3.2 },
    CatalogEntry { id: 6, title: "Heat", genres: "Action|Crime|Thriller", average_rating: 3.9 },
    CatalogEntry { id: 32, title: "Twelve Monkeys", genres: "Drama|Sci-Fi", average_rating: 3.9 },
    CatalogEntry { id: 47, title: "Seven", genres: "Crime|Thriller", average_rating: 4.1 },
    CatalogEntry { id: 50, title: "The Usual Suspects", genres: "Crime|Mystery|Thriller", average_rating: 4.5 },
    CatalogEntry { id: 100, title: "Fargo", genres: "Comedy|Crime|Drama|Thriller", average_rating: 4.3 },
    CatalogEntry { id: 110, title: "Braveheart", genres: "Action|Drama|War", average_rating: 4.2 },
    CatalogEntry { id: 150, title: "Apollo 13", genres: "Adventure|Drama|IMAX", average_rating: 3.9 },
    CatalogEntry { id: 200, title: "The Silence of the Lambs", genres: "Crime|Horror|Thriller", average_rating: 4.4 },
    CatalogEntry { id: 250, title: "The Shawshank Redemption", genres: "Drama", average_rating: 4.6 },
    CatalogEntry { id: 260, title: "Star Wars", genres: "Action|Adventure|Fantasy|Sci-Fi", average_rating: 4.5 },
    CatalogEntry { id: 300, title: "Forrest Gump", genres: "Comedy|Drama|Romance", average_rating: 4.1 },
    CatalogEntry { id: 350, title: "Pulp Fiction", genres: "Comedy|Crime|Drama", average_rating: 4.3 },
    CatalogEntry { id: 364, title: "The Lion King", genres: "Animation|Children|Drama", average_rating: 3.9 },
    CatalogEntry { id: 480, title: "Jurassic Park", genres: "Action|Adventure|Sci-Fi|Thriller", average_rating: 3.8 },
    CatalogEntry { id: 541, title: "Blade Runner", genres: "Action|Sci-Fi|Thriller", average_rating: 4.3 },
    CatalogEntry { id: 589, title: "Terminator 2", genres: "Action|Sci-Fi|Thriller", average_rating: 4.1 },
    CatalogEntry { id: 593, title: "Unforgiven", genres: "Drama|Western", average_rating: 4.0 },
    CatalogEntry { id: 858, title: "The Godfather", genres: "Crime|Drama", average_rating: 4.5 },
    CatalogEntry { id: 1097, title: "E.T. the Extra-Terrestrial", genres: "Children|Drama|Fantasy|Sci-Fi", average_rating: 3.9 },
    CatalogEntry { id: 1136, title: "Monty Python and the Holy Grail", genres: "Adventure|Comedy|Fantasy", average_rating: 4.2 },
    CatalogEntry { id: 1219, title: "Psycho", genres: "Crime|Horror", average_rating: 4.2 },
    CatalogEntry { id: 1721, title: "Titanic", genres: "Drama|Romance", average_rating: 3.6 },
];

/// The eight titles offered for rating, in menu order
pub const RATEABLE_ITEMS: [ItemId; 8] = [1, 50, 100, 150, 200, 250, 300, 350];

/// Label carried by fallback items
pub const FALLBACK_LABEL: &str = "Popular";

/// Looks up a catalog entry by id
pub fn find(id: ItemId) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|entry| entry.id == id)
}

/// The fixed fallback list: always available, always well-formed
pub fn fallback_recommendations() -> Vec<RecommendationItem> {
    [
        (1, "Toy Story", "Animation|Children|Comedy", 4.8),
        (50, "The Usual Suspects", "Crime|Mystery|Thriller", 4.7),
        (100, "Fargo", "Comedy|Crime|Drama", 4.9),
    ]
    .into_iter()
    .map(|(id, title, genres, score)| RecommendationItem {
        id,
        title: title.to_string(),
        genre_tags: genres.split('|').map(str::to_string).collect(),
        score,
        source_label: FALLBACK_LABEL.to_string(),
    })
    .collect()
}
