//! GraphQL documents sent to the Compass gateway.

pub const COMPONENT_BY_EXTERNAL_ALIAS: &str = r#"
query componentByExternalAlias($cloudId: ID!, $externalId: ID!, $externalSource: ID) {
  compass {
    componentByExternalAlias(cloudId: $cloudId, externalID: $externalId, externalSource: $externalSource) {
      __typename
      ... on CompassComponent {
        id
        name
        description
        typeId
        dataManager { ecosystemAppId externalSourceURL }
      }
      ... on QueryError {
        message
        extensions { statusCode }
      }
    }
  }
}
"#;

pub const CREATE_COMPONENT: &str = r#"
mutation createComponent($cloudId: ID!, $input: CreateCompassComponentInput!) {
  compass {
    createComponent(cloudId: $cloudId, input: $input) {
      success
      errors { message }
      componentDetails { id name description typeId }
    }
  }
}
"#;

pub const UPDATE_COMPONENT: &str = r#"
mutation updateComponent($input: UpdateCompassComponentInput!) {
  compass {
    updateComponent(input: $input) {
      success
      errors { message }
    }
  }
}
"#;

pub const CREATE_COMPONENT_LINK: &str = r#"
mutation createComponentLink($input: CreateCompassComponentLinkInput!) {
  compass {
    createComponentLink(input: $input) {
      success
      errors { message }
    }
  }
}
"#;

pub const CREATE_EXTERNAL_ALIAS: &str = r#"
mutation createComponentExternalAlias($input: CreateCompassComponentExternalAliasInput!) {
  compass {
    createComponentExternalAlias(input: $input) {
      success
      errors { message }
    }
  }
}
"#;

pub const DELETE_EXTERNAL_ALIAS: &str = r#"
mutation deleteComponentExternalAlias($input: DeleteCompassComponentExternalAliasInput!) {
  compass {
    deleteComponentExternalAlias(input: $input) {
      success
      errors { message }
    }
  }
}
"#;

pub const DETACH_DATA_MANAGER: &str = r#"
mutation detachComponentDataManager($input: DetachCompassComponentDataManagerInput!) {
  compass {
    detachComponentDataManager(input: $input) {
      success
      errors { message }
    }
  }
}
"#;

pub const CREATE_EVENT: &str = r#"
mutation createEvent($input: CompassCreateEventInput!) {
  compass {
    createEvent(input: $input) {
      success
      errors { message }
    }
  }
}
"#;

pub const INSERT_METRIC_VALUE: &str = r#"
mutation insertMetricValueByExternalId($input: CompassInsertMetricValueByExternalIdInput!) {
  compass {
    insertMetricValueByExternalId(input: $input) {
      success
      errors { message }
    }
  }
}
"#;
