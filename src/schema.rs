use sea_query::Iden;

/// Metadata table - key-value store for library configuration
#[derive(Iden)]
pub enum Metadata {
    Table,
    Key,
    Value,
}

/// Songs table - one row per completed song
#[derive(Iden)]
pub enum Songs {
    Table,
    Id,
    Title,
    Lyrics,
    MusicDescription,
    AlbumArtUrl,
    AudioData,
    CreatedAtMs,
}
