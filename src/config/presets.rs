//! Built-in extraction schemas
//!
//! Selectors follow the markup of albumoftheyear.org album, artist and
//! news listing pages.

use crate::config::types::{FieldKind, FieldSpec};
use crate::ConfigError;

/// Link pattern used with the album preset when none is configured
pub const ALBUM_LINK_PATTERN: &str = r"/album/\d+[^/]*\.php$";

/// Link pattern used with the artist preset when none is configured
pub const ARTIST_LINK_PATTERN: &str = r"/artist/\d+[^/]*/?$";

/// Follows the paged news listing
pub const NEWS_LINK_PATTERN: &str = r"/l/newsworthy(/\d+)?/?$";

/// Names accepted by `preset = "..."`
pub const PRESET_NAMES: [&str; 3] = ["album", "artist", "news"];

/// Returns the fields of a named preset
pub fn preset_fields(name: &str) -> Result<Vec<FieldSpec>, ConfigError> {
    match name {
        "album" => Ok(album_fields()),
        "artist" => Ok(artist_fields()),
        "news" => Ok(news_fields()),
        other => Err(ConfigError::UnknownPreset(other.to_string())),
    }
}

/// Returns the default link pattern of a named preset
pub fn preset_link_pattern(name: &str) -> Option<&'static str> {
    match name {
        "album" => Some(ALBUM_LINK_PATTERN),
        "artist" => Some(ARTIST_LINK_PATTERN),
        "news" => Some(NEWS_LINK_PATTERN),
        _ => None,
    }
}

fn album_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(
            "title",
            r#"h1.albumTitle span[itemprop="name"]"#,
            FieldKind::Text,
        ),
        FieldSpec::new(
            "artist",
            r#"div.artist span[itemprop="name"] a"#,
            FieldKind::Text,
        ),
        FieldSpec::new("cover_url", "div.albumTopBox.cover img", FieldKind::Attribute)
            .with_attribute("srcset"),
        FieldSpec::new(
            "critic_score",
            r#"div.albumCriticScore span[itemprop="ratingValue"] a"#,
            FieldKind::Number,
        )
        .with_attribute("title"),
        FieldSpec::new(
            "critic_review_count",
            r#"div.albumCriticScoreBox span[itemprop="ratingCount"]"#,
            FieldKind::Number,
        ),
        // "#4 / 1,203" reads as 4
        FieldSpec::new(
            "critic_rank_year",
            "div.albumCriticScoreBox .text.gray",
            FieldKind::Number,
        ),
        FieldSpec::new("user_score", "div.albumUserScore a", FieldKind::Number)
            .with_attribute("title"),
        FieldSpec::new(
            "user_rating_count",
            "div.albumUserScoreBox .text.numReviews strong",
            FieldKind::Number,
        ),
        FieldSpec::new(
            "user_rank_year",
            "div.albumUserScoreBox .text.gray strong a",
            FieldKind::Number,
        ),
        FieldSpec::new(
            "release_date",
            r#"div.albumTopBox.info div.detailRow meta[itemprop="datePublished"]"#,
            FieldKind::Date,
        )
        .with_attribute("content"),
        FieldSpec::new(
            "genres",
            r#"div.albumTopBox.info div.detailRow meta[itemprop="genre"]"#,
            FieldKind::List,
        )
        .with_attribute("content"),
        FieldSpec::new(
            "labels",
            r#"div.albumTopBox.info div.detailRow a[href*="/label/"]"#,
            FieldKind::List,
        ),
        FieldSpec::new("total_length", "div.totalLength", FieldKind::Text),
        FieldSpec::new("tracklist", "table.trackListTable tr", FieldKind::Nested).with_fields(
            vec![
                FieldSpec::new("number", "td.trackNumber", FieldKind::Number),
                FieldSpec::new("title", "td.trackTitle a", FieldKind::Text),
                FieldSpec::new("url", "td.trackTitle a", FieldKind::Attribute)
                    .with_attribute("href"),
                FieldSpec::new("duration", "td.trackTitle div.length", FieldKind::Text),
                FieldSpec::new(
                    "featured_artists",
                    "td.trackTitle div.featuredArtists a",
                    FieldKind::List,
                ),
                FieldSpec::new("rating", "td.trackRating span", FieldKind::Number),
            ],
        ),
        FieldSpec::new("buy_links", "div.buyButtons a", FieldKind::List).with_attribute("href"),
        FieldSpec::new(
            "critic_reviews",
            "div#criticReviewContainer div.albumReviewRow",
            FieldKind::Nested,
        )
        .with_fields(vec![
            FieldSpec::new("publication", "div.publication a", FieldKind::Text),
            FieldSpec::new("publication_url", "div.publication a", FieldKind::Attribute)
                .with_attribute("href"),
            FieldSpec::new("author", "div.author a", FieldKind::Text),
            FieldSpec::new("score", "div.albumReviewRating", FieldKind::Number),
            FieldSpec::new("text", "div.albumReviewText", FieldKind::Text),
            FieldSpec::new("url", "div.albumReviewLinks .extLink a", FieldKind::Attribute)
                .with_attribute("href"),
            FieldSpec::new("date", "div.albumReviewLinks .date", FieldKind::Attribute)
                .with_attribute("title"),
        ]),
        // Popular and recent reviews share one section
        FieldSpec::new("user_reviews", "section#users div.albumReviewRow", FieldKind::Nested)
            .with_fields(vec![
                FieldSpec::new("username", "div.userReviewName a", FieldKind::Text),
                FieldSpec::new("user_url", "div.userReviewName a", FieldKind::Attribute)
                    .with_attribute("href"),
                FieldSpec::new("rating", "div.ratingBlock div.rating", FieldKind::Number),
                FieldSpec::new("text", "div.albumReviewText.user", FieldKind::Text),
                FieldSpec::new("date", "div.albumReviewLinks .review_date", FieldKind::Text),
                FieldSpec::new("likes", "div.review_likes", FieldKind::Number),
                FieldSpec::new("comment_count", "div.comment_count", FieldKind::Number),
            ]),
        // Similar albums and more by the artist
        FieldSpec::new("related_albums", "div.section .albumBlock.small", FieldKind::Nested)
            .with_fields(album_block_fields()),
    ]
}

fn artist_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("name", "h1.artistHeadline", FieldKind::Text),
        FieldSpec::new("cover_url", "div.artistImage img", FieldKind::Attribute)
            .with_attribute("srcset"),
        FieldSpec::new(
            "critic_score",
            r#"div.artistCriticScore span[itemprop="ratingValue"]"#,
            FieldKind::Number,
        ),
        FieldSpec::new(
            "critic_review_count",
            r#"div.artistCriticScoreBox span[itemprop="reviewCount"]"#,
            FieldKind::Number,
        ),
        FieldSpec::new("user_score", "div.artistUserScore", FieldKind::Number),
        FieldSpec::new(
            "user_rating_count",
            "div.artistUserScoreBox strong",
            FieldKind::Number,
        ),
        FieldSpec::new(
            "genres",
            r#"div.artistTopBox.info div.detailRow a[href*="/genre/"]"#,
            FieldKind::List,
        ),
        FieldSpec::new(
            "associated_artists",
            r#"div.artistTopBox.info div.detailRow a[href*="/artist/"]"#,
            FieldKind::List,
        ),
        FieldSpec::new("discography", "div#albumOutput div.albumBlock", FieldKind::Nested)
            .with_fields(album_block_fields()),
        FieldSpec::new(
            "top_songs",
            "div.mediaList table.trackListTable tr",
            FieldKind::Nested,
        )
        .with_fields(vec![
            FieldSpec::new(
                "title",
                r#"td.songAlbum div[style="font-weight: bold"] a"#,
                FieldKind::Text,
            ),
            FieldSpec::new(
                "url",
                r#"td.songAlbum div[style="font-weight: bold"] a"#,
                FieldKind::Attribute,
            )
            .with_attribute("href"),
            FieldSpec::new("album_title", "td.songAlbum div.gray-font", FieldKind::Text),
            FieldSpec::new("album_url", "td.coverart a", FieldKind::Attribute)
                .with_attribute("href"),
            FieldSpec::new("rating", "td.trackRating span", FieldKind::Number),
        ]),
        FieldSpec::new(
            "similar_artists",
            "div.relatedArtists .artistBlock",
            FieldKind::Nested,
        )
        .with_fields(vec![
            FieldSpec::new("name", "div.name a", FieldKind::Text),
            FieldSpec::new("url", "div.name a", FieldKind::Attribute).with_attribute("href"),
            FieldSpec::new("image_url", "div.image img", FieldKind::Attribute)
                .with_attribute("srcset"),
        ]),
    ]
}

fn news_fields() -> Vec<FieldSpec> {
    vec![FieldSpec::new("articles", "div.mediaContainer", FieldKind::Nested).with_fields(vec![
        FieldSpec::new("title", "div.content > div.title > a", FieldKind::Text),
        FieldSpec::new("url", "div.content > div.title > a", FieldKind::Attribute)
            .with_attribute("href"),
        FieldSpec::new(
            "published",
            "div.content > div.sourceRow > div.postDate",
            FieldKind::Text,
        ),
    ])]
}

/// Sub-fields of an album tile in listings and discographies
fn album_block_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("title", "a div.albumTitle", FieldKind::Text),
        FieldSpec::new("artist", "a div.artistTitle", FieldKind::Text),
        FieldSpec::new("url", "a", FieldKind::Attribute).with_attribute("href"),
        FieldSpec::new("year", "div.type", FieldKind::Number),
        FieldSpec::new("cover_url", "div.image img", FieldKind::Attribute)
            .with_attribute("srcset"),
        FieldSpec::new("ratings", "div.ratingRow", FieldKind::List),
    ]
}
