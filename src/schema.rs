// Table definitions matching `DbContext::init_schema`.

diesel::table! {
    video_ids (video_id) {
        video_id -> Text,
        discovered_at -> Text,
        failed_metadata -> Bool,
        failed_file -> Bool,
    }
}

diesel::table! {
    yt_metadata (video_id) {
        video_id -> Text,
        kind -> Nullable<Text>,
        etag -> Nullable<Text>,
        title -> Nullable<Text>,
        description -> Nullable<Text>,
        published_at -> Nullable<Text>,
        channel_id -> Nullable<Text>,
        channel_title -> Nullable<Text>,
        category_id -> Nullable<Text>,
        live_broadcast_content -> Nullable<Text>,
        default_language -> Nullable<Text>,
        default_audio_language -> Nullable<Text>,
        duration -> Nullable<Text>,
        dimension -> Nullable<Text>,
        definition -> Nullable<Text>,
        caption -> Nullable<Text>,
        licensed_content -> Nullable<Bool>,
        projection -> Nullable<Text>,
        upload_status -> Nullable<Text>,
        privacy_status -> Nullable<Text>,
        license -> Nullable<Text>,
        embeddable -> Nullable<Bool>,
        public_stats_viewable -> Nullable<Bool>,
        made_for_kids -> Nullable<Bool>,
        view_count -> Nullable<BigInt>,
        like_count -> Nullable<BigInt>,
        dislike_count -> BigInt,
        favorite_count -> Nullable<BigInt>,
        comment_count -> Nullable<BigInt>,
        event_date -> Nullable<Text>,
        updated_at -> Text,
    }
}

diesel::table! {
    yt_tags (video_id, tag) {
        video_id -> Text,
        tag -> Text,
    }
}

diesel::table! {
    yt_thumbnails (video_id, thumbnail_size) {
        video_id -> Text,
        thumbnail_size -> Text,
        url -> Text,
        width -> Nullable<Integer>,
        height -> Nullable<Integer>,
    }
}

diesel::table! {
    yt_localized (video_id, language) {
        video_id -> Text,
        language -> Text,
        title -> Nullable<Text>,
        description -> Nullable<Text>,
    }
}

diesel::table! {
    yt_topic_categories (video_id, category) {
        video_id -> Text,
        category -> Text,
    }
}

diesel::table! {
    yt_video_files (video_id) {
        video_id -> Text,
        format_id -> Nullable<Text>,
        file_size -> BigInt,
        local_path -> Text,
        downloaded_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    video_ids,
    yt_metadata,
    yt_tags,
    yt_thumbnails,
    yt_localized,
    yt_topic_categories,
    yt_video_files,
);
