//! GraphQL documents for every operation the client issues.

/// Fields selected for every article.
macro_rules! article_fields {
  () => {
    r#"
    slug
    title
    excerpt
    publishedAt
    createdAt
    updatedAt
    featured
    tags
    categories { slug name description }
    author { id name avatar { url width height alt } }
    coverImage { url width height alt }
"#
  };
}

macro_rules! with_article_fields {
  ($head:literal, $tail:literal) => {
    concat!($head, article_fields!(), $tail)
  };
}

pub const GET_POSTS_PAGINATED: &str = with_article_fields!(
  r#"query GetPostsPaginated($first: Int!, $after: String) {
  postsConnection(first: $first, after: $after, orderBy: publishedAt_DESC) {
    edges { cursor node {"#,
  r#"} }
    pageInfo { hasNextPage hasPreviousPage startCursor endCursor }
    aggregate { count }
  }
}"#
);

pub const GET_CATEGORY_POSTS_PAGINATED: &str = with_article_fields!(
  r#"query GetCategoryPostsPaginated($slug: String!, $first: Int!, $after: String) {
  postsConnection(
    first: $first
    after: $after
    orderBy: publishedAt_DESC
    where: { categories_some: { slug: $slug } }
  ) {
    edges { cursor node {"#,
  r#"} }
    pageInfo { hasNextPage hasPreviousPage startCursor endCursor }
    aggregate { count }
  }
}"#
);

pub const GET_TAG_POSTS_PAGINATED: &str = with_article_fields!(
  r#"query GetTagPostsPaginated($tag: String!, $first: Int!, $after: String) {
  postsConnection(
    first: $first
    after: $after
    orderBy: createdAt_DESC
    where: { tags_contains_some: [$tag] }
  ) {
    edges { cursor node {"#,
  r#"} }
    pageInfo { hasNextPage hasPreviousPage startCursor endCursor }
    aggregate { count }
  }
}"#
);

pub const GET_POSTS_WITH_OFFSET: &str = with_article_fields!(
  r#"query GetPostsWithOffset($first: Int!, $skip: Int!) {
  postsConnection(first: $first, skip: $skip, orderBy: publishedAt_DESC) {
    edges { cursor node {"#,
  r#"} }
    pageInfo { hasNextPage hasPreviousPage startCursor endCursor }
    aggregate { count }
  }
}"#
);

pub const GET_TOTAL_POSTS_COUNT: &str = r#"query GetTotalPostsCount {
  postsConnection {
    aggregate { count }
  }
}"#;

pub const GET_FEATURED_POSTS: &str = with_article_fields!(
  r#"query GetFeaturedPosts($first: Int!) {
  posts(first: $first, orderBy: publishedAt_DESC, where: { featured: true }) {"#,
  r#"}
}"#
);

pub const GET_RECENT_POSTS: &str = with_article_fields!(
  r#"query GetRecentPosts($first: Int!) {
  posts(first: $first, orderBy: publishedAt_DESC) {"#,
  r#"}
}"#
);

pub const GET_CATEGORIES: &str = r#"query GetCategories {
  categories(orderBy: name_ASC) {
    slug
    name
    description
  }
}"#;

pub const GET_POST_BY_SLUG: &str = with_article_fields!(
  r#"query GetPostBySlug($slug: String!) {
  post(where: { slug: $slug }) {"#,
  r#"}
}"#
);
