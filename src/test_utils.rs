pub mod ast {
    macro_rules! proxy {
        ($id:expr) => {
            $crate::ast::ExpressionNode::Proxy {
                id: $crate::catalog::ProxyId($id),
            }
        };
    }

    macro_rules! and {
        ($($child:expr),+ $(,)?) => {
            $crate::ast::ExpressionNode::And {
                children: vec![$($child),+],
            }
        };
    }

    macro_rules! or {
        ($($child:expr),+ $(,)?) => {
            $crate::ast::ExpressionNode::Or {
                children: vec![$($child),+],
            }
        };
    }

    pub(crate) use and;
    pub(crate) use or;
    pub(crate) use proxy;
}
